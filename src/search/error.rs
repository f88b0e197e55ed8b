//! # Search Error Types Module
//!
//! Failure modes of the retrieval and answer synthesis pipeline.

use thiserror::Error;

use crate::error::Error as CrateError;
use crate::processor::ProcessError;

/// Errors that can occur during search operations
#[derive(Debug, Error)]
pub enum SearchError {
    /// Error occurred during query embedding
    #[error("Embedding error: {0}")]
    Embedding(#[from] ProcessError),

    /// The completion oracle failed
    #[error("Completion error: {0}")]
    Completion(#[from] rig::completion::CompletionError),

    /// Invalid search parameters
    #[error("Invalid search parameters: {0}")]
    InvalidParameters(String),
}

impl From<SearchError> for CrateError {
    fn from(err: SearchError) -> Self {
        CrateError::Search(err.to_string())
    }
}
