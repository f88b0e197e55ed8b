//! Error types for the sitechat crate

use thiserror::Error;

/// Result type for sitechat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for sitechat operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Terminal output error
    #[error("Output error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration (API keys, paths)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Web crawling error
    #[error("Crawl error: {0}")]
    Crawl(String),

    /// Record store error
    #[error("Database error: {0}")]
    Database(String),

    /// Content processing error
    #[error("Process error: {0}")]
    Process(String),

    /// Vector index build or load error
    #[error("Index error: {0}")]
    Index(String),

    /// Retrieval or answer synthesis error
    #[error("Search error: {0}")]
    Search(String),

    /// Subject catalog or classification error
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
