//! # Mock Models for Testing
//!
//! `MockCompletionModel` returns queued or fixed answers and records every
//! preamble it was sent. `MockEmbeddingModel` hashes words into a small
//! normalized vector so texts sharing words land close together.

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    embeddings::{Embedding, EmbeddingError, EmbeddingModel},
    one_or_many::OneOrMany,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// A mock completion model for testing purposes.
///
/// Queued responses are returned first, in order; after that the fixed
/// response (or empty text) is returned.
#[derive(Debug, Clone, Default)]
pub struct MockCompletionModel {
    response: Arc<Mutex<Option<OneOrMany<AssistantContent>>>>,
    queued: Arc<Mutex<VecDeque<String>>>,
    preambles: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockCompletionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the response that the mock model should return.
    pub async fn set_response(&self, response: OneOrMany<AssistantContent>) {
        let mut guard = self.response.lock().await;
        *guard = Some(response);
    }

    /// Helper to create a simple text response.
    pub async fn set_text_response(&self, text: &str) {
        self.set_response(OneOrMany::one(AssistantContent::text(text)))
            .await;
    }

    /// Answer the next call with `text`, ahead of the fixed response
    pub async fn push_text_response(&self, text: &str) {
        self.queued.lock().await.push_back(text.to_string());
    }

    pub fn completion_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Preambles of every request so far, oldest first
    pub async fn preambles(&self) -> Vec<String> {
        self.preambles.lock().await.clone()
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.preambles
            .lock()
            .await
            .push(completion_request.preamble.clone().unwrap_or_default());

        if let Some(text) = self.queued.lock().await.pop_front() {
            return Ok(CompletionResponse {
                choice: OneOrMany::one(AssistantContent::text(&text)),
                raw_response: text,
            });
        }

        let response = self.response.lock().await.clone();
        Ok(CompletionResponse {
            choice: response.unwrap_or_else(|| OneOrMany::one(AssistantContent::text(""))),
            raw_response: "".to_string(),
        })
    }
}

const MOCK_DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder
#[derive(Debug, Clone, Default)]
pub struct MockEmbeddingModel {
    overrides: Arc<Mutex<HashMap<String, Vec<f64>>>>,
    calls: Arc<AtomicUsize>,
}

impl MockEmbeddingModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `embed_texts` calls so far
    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Embed `text` as exactly `vec` from now on
    pub async fn set_vector(&self, text: &str, vec: Vec<f64>) {
        self.overrides.lock().await.insert(text.to_string(), vec);
    }

    fn hash_word(word: &str) -> usize {
        // FNV-1a
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % MOCK_DIMENSIONS as u64) as usize
    }

    fn bag_of_words(text: &str) -> Vec<f64> {
        let mut vec = vec![0.0; MOCK_DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vec[Self::hash_word(&word.to_lowercase())] += 1.0;
        }
        let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            vec.iter_mut().for_each(|v| *v /= norm);
        }
        vec
    }
}

impl EmbeddingModel for MockEmbeddingModel {
    const MAX_DOCUMENTS: usize = 32;

    fn ndims(&self) -> usize {
        MOCK_DIMENSIONS
    }

    async fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> Result<Vec<Embedding>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let overrides = self.overrides.lock().await.clone();
        Ok(texts
            .into_iter()
            .map(|document| {
                let vec = overrides
                    .get(&document)
                    .cloned()
                    .unwrap_or_else(|| Self::bag_of_words(&document));
                Embedding { document, vec }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let model = MockEmbeddingModel::new();
        let embeddings = model
            .embed_texts(vec![
                "ticket prices".to_string(),
                "Ticket prices for students".to_string(),
                "parking garage".to_string(),
            ])
            .await
            .unwrap();

        let dot = |a: &Embedding, b: &Embedding| -> f64 {
            a.vec.iter().zip(&b.vec).map(|(x, y)| x * y).sum()
        };
        assert!(dot(&embeddings[0], &embeddings[1]) > dot(&embeddings[0], &embeddings[2]));
        assert_eq!(model.embed_calls(), 1);
    }

    #[tokio::test]
    async fn test_queued_responses_come_first() {
        let model = MockCompletionModel::new();
        model.set_text_response("fixed").await;
        model.push_text_response("queued").await;

        let first = model.completion_request("a").send().await.unwrap();
        let second = model.completion_request("b").send().await.unwrap();
        assert_eq!(first.raw_response, "queued");
        assert_eq!(second.raw_response, "");
        assert_eq!(model.completion_calls(), 2);
    }
}
