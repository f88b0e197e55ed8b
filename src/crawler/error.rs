//! # Crawler Error Types
//!
//! Failures that escape the crawler. Individual page fetch failures never
//! appear here; they degrade to an empty placeholder page instead.

use crate::error::Error as CrateError;
use crate::store::DbError;
use thiserror::Error;

/// Error type for crawler operations
#[derive(Debug, Error)]
pub enum CrawlError {
    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A site root without a host
    #[error("Invalid site root: {0}")]
    InvalidRoot(String),

    /// Sitemap XML could not be parsed
    #[error("Sitemap parsing error: {0}")]
    SitemapParse(String),

    /// Record store error
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl From<CrawlError> for CrateError {
    fn from(err: CrawlError) -> Self {
        match err {
            CrawlError::Http(e) => CrateError::Http(e),
            CrawlError::Storage(e) => e.into(),
            _ => CrateError::Crawl(err.to_string()),
        }
    }
}
