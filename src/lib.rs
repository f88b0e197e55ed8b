//! # sitechat - Site and Document Indexing with Two-Stage Retrieval
//!
//! This crate is the backend of a retrieval-augmented chatbot. It turns
//! websites and paginated documents into vector indexes and answers
//! questions from them with cited sources.
//!
//! ## Features
//!
//! - Sitemap discovery (robots.txt and well-known locations) with a bounded,
//!   most-linked-first crawl fallback
//! - Inbound-link tallies (pagerank) and site-wide text fragment counts
//!   (textrank) to drop boilerplate from page text
//! - Page and domain records in LibSQL
//! - Build-or-load vector indexes, one directory per site or document
//! - Two-stage retrieval: broad top-k with a similarity cutoff, then a narrow
//!   re-rank restricted to the broad candidates
//! - Subject classification over a catalog and per-conversation chat history
//! - Rate-limited model access through rig
//!
//! ## Example
//!
//! ```rust,no_run
//! use sitechat::crawler::{CrawlerConfig, DomainLocks, PageFetcher, PageIndexer, SiteRoot};
//! use sitechat::index::{IndexBuilder, IndexKey};
//! use sitechat::model::GeminiClient;
//! use sitechat::search::{Retriever, RetrieverConfig};
//! use sitechat::store::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new_from_path("data/sitechat.db").await?;
//!     let client = GeminiClient::new_gemini_from_env()?;
//!
//!     let fetcher = PageFetcher::new(db.clone(), CrawlerConfig::default())?;
//!     let indexer = PageIndexer::new(fetcher, DomainLocks::new());
//!     let builder = IndexBuilder::new(client.embedding().clone(), indexer, db);
//!
//!     let key = IndexKey::Domain(SiteRoot::parse("https://designweek.example.org")?);
//!     let index = builder.build_or_load(&key).await?;
//!
//!     let retriever = Retriever::new(client, RetrieverConfig::default());
//!     let answer = retriever.query(&index, "When do the doors open?").await?;
//!     println!("{}\n\nSources: {:?}", answer.text, answer.sources);
//!     Ok(())
//! }
//! ```

mod error;
mod markdown;
pub mod model;

// Pipeline modules
pub mod crawler;
pub mod index;
pub mod processor;
pub mod search;
pub mod store;

// Conversation layer
pub mod batch;
pub mod catalog;
pub mod chat;

pub use error::Error;
pub use markdown::{format_markdown, render as render_markdown};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::error::Error;
    pub use crate::error::Result;
}
