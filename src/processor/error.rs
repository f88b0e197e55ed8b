//! # Processor Error Types

use crate::error::Error as CrateError;
use thiserror::Error;

/// Error type for processor operations
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Embedding generation error
    #[error("Embedding generation error: {0}")]
    EmbeddingGeneration(String),

    /// The embedding model returned an unexpected number of vectors
    #[error("Embedding processing error: {0}")]
    EmbeddingProcessing(String),

    /// Chunking error
    #[error("Chunking error: {0}")]
    Chunking(String),

    /// A fixed document could not be read
    #[error("Document error: {0}")]
    Document(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<ProcessError> for CrateError {
    fn from(err: ProcessError) -> Self {
        CrateError::Process(err.to_string())
    }
}

impl From<rig::embeddings::EmbeddingError> for ProcessError {
    fn from(err: rig::embeddings::EmbeddingError) -> Self {
        Self::EmbeddingGeneration(err.to_string())
    }
}
