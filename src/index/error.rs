//! Error types for building, persisting and loading vector indexes

use crate::crawler::CrawlError;
use crate::error::Error as CrateError;
use crate::processor::ProcessError;
use crate::store::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// Nothing to index for the key, even after crawling
    #[error("No source text available for index '{key}'")]
    NoSourceText { key: String },

    /// Key that cannot name an index directory
    #[error("Invalid index key '{0}'")]
    InvalidKey(String),

    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("Record store error: {0}")]
    Store(#[from] DbError),

    #[error("Processing error: {0}")]
    Process(#[from] ProcessError),

    /// Failure reading or writing the on-disk index
    #[error("Index storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IndexError> for CrateError {
    fn from(err: IndexError) -> Self {
        CrateError::Index(err.to_string())
    }
}
