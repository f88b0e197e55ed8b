//! Content processor module for RAG
//!
//! Turns gathered source text (page text or document pages) into embedded
//! chunks ready for the vector index.

mod chunking;
mod config;
pub mod document;
pub mod embedding;
mod error;

pub use chunking::{TextChunk, chunk_text};
pub use config::{ChunkOptions, ProcessorConfig, ProcessorConfigBuilder};
pub use embedding::{embed_chunks, embed_query};
pub use error::ProcessError;

use crate::index::SourceRef;
use rig::embeddings::{Embedding, EmbeddingModel};
use tracing::{info, instrument};

/// Text gathered for indexing, tagged with where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub source: SourceRef,
    pub text: String,
}

/// Represents a processed chunk with its embedding
#[derive(Debug, Clone)]
pub struct ProcessedChunk {
    /// Page URL or document page the chunk was cut from
    pub source: SourceRef,

    /// The text of the chunk
    pub text: String,

    /// The position of the chunk within its source
    pub position: usize,

    /// The heading of the chunk
    pub heading: Option<String>,

    /// The embedding of the chunk
    pub embedding: Embedding,
}

/// Chunk every document, keeping its source on each chunk
pub fn chunk_documents(
    documents: &[SourceDocument],
    options: &ChunkOptions,
) -> Result<Vec<(SourceRef, TextChunk)>, ProcessError> {
    let mut chunks = Vec::new();
    for document in documents {
        for chunk in chunk_text(&document.text, options)? {
            chunks.push((document.source.clone(), chunk));
        }
    }
    Ok(chunks)
}

/// Chunk and embed documents
#[instrument(skip(model, documents, config), fields(documents = documents.len()))]
pub async fn process_documents<E: EmbeddingModel>(
    model: &E,
    documents: &[SourceDocument],
    config: &ProcessorConfig,
) -> Result<Vec<ProcessedChunk>, ProcessError> {
    let chunks = chunk_documents(documents, &config.chunk_options)?;
    info!("Created {} chunks from {} documents", chunks.len(), documents.len());
    embed_chunks(model, chunks, config.embedding_batch_size).await
}
