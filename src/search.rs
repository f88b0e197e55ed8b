//! # Two-Stage Retrieval Module
//!
//! The "retrieval" and "generation" halves of the RAG pipeline.
//!
//! ## Retrieval Process
//!
//! 1. Embed the query text
//! 2. Stage 1: broad top-k over the whole index, then drop nodes scoring
//!    below the similarity cutoff
//! 3. Stage 2: narrow top-k restricted to the stage 1 node ids
//! 4. Synthesize an answer from a temporary index over the stage 2 nodes,
//!    or return the not-found message when nothing survived
//!
//! Sources are the distinct back-references of the stage 2 nodes, sorted.

mod error;

pub use error::SearchError;

use crate::index::{ScoredNode, SourceRef, VectorIndex};
use crate::model::Client;
use crate::processor::embed_query;
use rig::completion::{AssistantContent, CompletionModel};
use rig::embeddings::EmbeddingModel;
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, instrument};

pub const DEFAULT_NOT_FOUND_MESSAGE: &str =
    "The organizer does not seem to have shared this information. Try visiting the website yourself.";

/// Placeholders: `{context}`, `{history}` and `{not_found}`
pub const DEFAULT_INSTRUCTION_TEMPLATE: &str = "You assist people in a conversational form. \
Answer the question using only the context information below, without relying on prior knowledge. \
Use the conversation so far to understand what is being asked. \
Respond in markdown format. Be detailed in your answer but don't repeat yourself.
If you are unable to answer using the given context, respond with \"{not_found}\"

Conversation so far:
{history}

Context:
{context}
";

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub broad_top_k: usize,
    pub narrow_top_k: usize,
    /// Stage 1 nodes scoring below this are discarded
    pub similarity_cutoff: Option<f64>,
    pub not_found_message: String,
    pub instruction_template: String,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            broad_top_k: 10,
            narrow_top_k: 2,
            similarity_cutoff: Some(0.7),
            not_found_message: DEFAULT_NOT_FOUND_MESSAGE.to_string(),
            instruction_template: DEFAULT_INSTRUCTION_TEMPLATE.to_string(),
        }
    }
}

impl RetrieverConfig {
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    pub fn broad_top_k(mut self, k: usize) -> Self {
        self.config.broad_top_k = k;
        self
    }

    pub fn narrow_top_k(mut self, k: usize) -> Self {
        self.config.narrow_top_k = k;
        self
    }

    pub fn similarity_cutoff(mut self, cutoff: Option<f64>) -> Self {
        self.config.similarity_cutoff = cutoff;
        self
    }

    pub fn not_found_message(mut self, message: impl Into<String>) -> Self {
        self.config.not_found_message = message.into();
        self
    }

    pub fn instruction_template(mut self, template: impl Into<String>) -> Self {
        self.config.instruction_template = template.into();
        self
    }

    pub fn build(self) -> RetrieverConfig {
        self.config
    }
}

/// Nodes surviving each retrieval stage, best first
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub broad: Vec<ScoredNode>,
    pub narrow: Vec<ScoredNode>,
}

/// A synthesized answer with the sources it was grounded on
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub nodes: Vec<ScoredNode>,
}

pub struct Retriever<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    client: Client<C, E>,
    config: RetrieverConfig,
}

impl<C, E> Retriever<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(client: Client<C, E>, config: RetrieverConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    pub fn client(&self) -> &Client<C, E> {
        &self.client
    }

    /// Run both retrieval stages for `query`
    #[instrument(skip(self, index), fields(key = index.key()))]
    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<Retrieval, SearchError> {
        if self.config.broad_top_k == 0 || self.config.narrow_top_k == 0 {
            return Err(SearchError::InvalidParameters(
                "top_k values must be greater than zero".to_string(),
            ));
        }

        let embedding = embed_query(self.client.embedding(), query).await?;

        let mut broad = index.search(&embedding, self.config.broad_top_k, None);
        if let Some(cutoff) = self.config.similarity_cutoff {
            broad.retain(|hit| hit.score >= cutoff);
        }

        let candidates: HashSet<String> = broad.iter().map(|hit| hit.node.id.clone()).collect();
        let narrow = if candidates.is_empty() {
            Vec::new()
        } else {
            index.search(&embedding, self.config.narrow_top_k, Some(&candidates))
        };

        debug!(broad = broad.len(), narrow = narrow.len(), "Retrieved nodes");
        Ok(Retrieval { broad, narrow })
    }

    /// Answer a standalone question
    pub async fn query(&self, index: &VectorIndex, query: &str) -> Result<Answer, SearchError> {
        self.query_with_history(index, query, "").await
    }

    /// Answer a question, giving the model the conversation so far
    #[instrument(skip(self, index, history), fields(key = index.key()))]
    pub async fn query_with_history(
        &self,
        index: &VectorIndex,
        query: &str,
        history: &str,
    ) -> Result<Answer, SearchError> {
        let retrieval = self.retrieve(index, query).await?;
        let sources: Vec<SourceRef> = retrieval
            .narrow
            .iter()
            .map(|hit| hit.node.source.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let ids: HashSet<String> = retrieval.narrow.iter().map(|hit| hit.node.id.clone()).collect();
        let context_index = index.subset(&ids);
        if context_index.is_empty() {
            info!("No context passed retrieval");
            return Ok(Answer {
                text: self.config.not_found_message.clone(),
                sources,
                nodes: retrieval.narrow,
            });
        }

        let preamble = self.render_instruction(&context_index, history);
        let response = self
            .client
            .completion()
            .completion_request(query)
            .preamble(preamble)
            .send()
            .await?;

        let text = response
            .choice
            .iter()
            .map(|content| match content {
                AssistantContent::Text(text) => text.text.clone(),
                _ => "".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        let text = match text.trim() {
            "" => self.config.not_found_message.clone(),
            answer => answer.to_string(),
        };

        Ok(Answer {
            text,
            sources,
            nodes: retrieval.narrow,
        })
    }

    fn render_instruction(&self, context_index: &VectorIndex, history: &str) -> String {
        let context = context_index
            .nodes()
            .iter()
            .map(|node| match &node.heading {
                Some(heading) => format!("[{}] {}\n{}", node.source, heading, node.text),
                None => format!("[{}]\n{}", node.source, node.text),
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");

        self.config
            .instruction_template
            .replace("{not_found}", &self.config.not_found_message)
            .replace("{history}", if history.is_empty() { "(none)" } else { history })
            .replace("{context}", &context)
    }
}
