//! # LLM Client Module
//!
//! A unified client over a completion model and an embedding model, with
//! built-in rate limiting to prevent API quota exhaustion.
//!
//! ## Key Components
//!
//! - `Client`: wraps the completion oracle and the embedding backend
//! - `RateLimitedCompletionModel` / `RateLimitedEmbeddingModel`: quota wrappers
//! - `EmbeddingConversion`: embedding <-> little-endian f32 blob conversion

use std::num::NonZeroU32;

use governor::{Quota, RateLimiter};
use ratelimited_completion::RateLimitedCompletionModel;
use ratelimited_embedding::RateLimitedEmbeddingModel;
use rig::{completion::CompletionModel, embeddings::EmbeddingModel, providers::gemini};

use crate::error::Error;

pub mod embedding;
#[cfg(test)]
pub mod mock_model;
pub mod ratelimited_completion;
pub mod ratelimited_embedding;

pub use embedding::EmbeddingConversion;

const STANDARD_COMPLETIONS_PER_MINUTE: NonZeroU32 = NonZeroU32::MIN.saturating_add(1999);
const FREE_COMPLETIONS_PER_MINUTE: NonZeroU32 = NonZeroU32::MIN.saturating_add(29);
const EMBEDDINGS_PER_MINUTE: NonZeroU32 = NonZeroU32::MIN.saturating_add(999);

/// Provider tier selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    /// Gemini with the standard quota (`GEMINI_API_KEY`)
    Gemini,
    /// Gemini free tier (`GEMINI_FREE_API_KEY`)
    GeminiFree,
}

#[derive(Debug, Clone)]
pub struct Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    completion_model: C,
    embedding_model: E,
}

pub struct RateLimitResponse<T> {
    #[allow(dead_code)]
    response: T,
}

pub type GeminiClient = Client<
    RateLimitedCompletionModel<gemini::completion::CompletionModel>,
    RateLimitedEmbeddingModel<gemini::embedding::EmbeddingModel>,
>;

fn api_key(var: &str) -> Result<String, Error> {
    std::env::var(var)
        .map_err(|_| Error::Config(format!("{} environment variable must be set", var)))
}

impl GeminiClient {
    pub fn from_env(provider: Provider) -> Result<Self, Error> {
        match provider {
            Provider::Gemini => Self::new_gemini_from_env(),
            Provider::GeminiFree => Self::new_gemini_free_from_env(),
        }
    }

    pub fn new_gemini_from_env() -> Result<Self, Error> {
        let gemini_client = gemini::Client::new(&api_key("GEMINI_API_KEY")?);
        Ok(Self::new_gemini(gemini_client))
    }

    pub fn new_gemini_free_from_env() -> Result<Self, Error> {
        let gemini_client = gemini::Client::new(&api_key("GEMINI_FREE_API_KEY")?);
        Ok(Self::new_gemini_free(gemini_client))
    }

    pub fn new_gemini(gemini_client: gemini::Client) -> Self {
        Self::gemini_with_quota(
            gemini_client,
            "gemini-2.0-flash",
            STANDARD_COMPLETIONS_PER_MINUTE,
        )
    }

    pub fn new_gemini_free(gemini_client: gemini::Client) -> Self {
        Self::gemini_with_quota(
            gemini_client,
            "gemini-2.0-flash-lite",
            FREE_COMPLETIONS_PER_MINUTE,
        )
    }

    fn gemini_with_quota(
        gemini_client: gemini::Client,
        completion_model: &str,
        completions_per_minute: NonZeroU32,
    ) -> Self {
        let completion_limiter = RateLimiter::direct(Quota::per_minute(completions_per_minute));
        let embedding_limiter = RateLimiter::direct(Quota::per_minute(EMBEDDINGS_PER_MINUTE));
        Self::new(
            RateLimitedCompletionModel::new(
                gemini_client.completion_model(completion_model),
                completion_limiter,
            ),
            RateLimitedEmbeddingModel::new(
                gemini_client.embedding_model(gemini::embedding::EMBEDDING_004),
                embedding_limiter,
            ),
        )
    }
}

impl<C, E> Client<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(completion_model: C, embedding_model: E) -> Self {
        Self {
            completion_model,
            embedding_model,
        }
    }

    pub fn completion(&self) -> &C {
        &self.completion_model
    }

    pub fn embedding(&self) -> &E {
        &self.embedding_model
    }
}
