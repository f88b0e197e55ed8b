//! # Record Store
//!
//! Persistent records for crawled sites and conversations, backed by libsql.
//!
//! ## Key Components
//!
//! - `Database`: get/create/list/update operations for every record type
//! - `Domain` / `SiteUrl`: one crawled host and one of its pages
//! - `RankMap`: pagerank and textrank tallies with a portable JSON encoding
//! - `StoredMessage`: one turn of a persisted conversation

mod database;
pub mod error;
pub mod rank_map;
mod schema;

pub use database::Database;
pub use error::DbError;
pub use rank_map::RankMap;

use serde::{Deserialize, Serialize};

/// Delimiter between URLs in the stored sitemap column
pub const SITEMAP_DELIMITER: &str = " , ";

/// A crawled site, one per host
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub id: i64,
    /// Host name, including any port
    pub domain: String,
    /// Ordered page URLs making up the site
    pub sitemap: Vec<String>,
    pub pagerank: RankMap,
    pub textrank: RankMap,
    /// Seconds taken by the indexing run that created the record
    pub time_to_index: f64,
    pub ts_created: i64,
    pub ts_updated: i64,
}

/// Fields for creating or refreshing a `Domain`
#[derive(Debug, Clone, Default)]
pub struct NewDomain {
    pub domain: String,
    pub sitemap: Vec<String>,
    pub pagerank: RankMap,
    pub textrank: RankMap,
    pub time_to_index: f64,
}

/// One page of a crawled site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteUrl {
    pub id: i64,
    pub url: String,
    pub domain: String,
    /// Raw HTML, `None` until fetched successfully
    pub html: Option<String>,
    /// Ranked text, `None` until parsed
    pub text: Option<String>,
    pub ts_created: i64,
    pub ts_updated: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "user" => Some(Sender::User),
            "assistant" => Some(Sender::Assistant),
            _ => None,
        }
    }
}

/// A persisted conversation header
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: i64,
    /// Subject the conversation was classified under, once known
    pub subject: Option<String>,
    pub ts_created: i64,
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: i64,
    pub conversation_id: i64,
    pub sender: Sender,
    pub content: String,
    pub ts_created: i64,
}

/// Join sitemap URLs into the stored column format
pub fn join_sitemap(urls: &[String]) -> String {
    urls.join(SITEMAP_DELIMITER)
}

/// Split the stored sitemap column back into URLs
pub fn split_sitemap(raw: &str) -> Vec<String> {
    raw.split(SITEMAP_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sitemap_column_round_trip() {
        let urls = vec![
            "https://example.com/".to_string(),
            "https://example.com/about".to_string(),
        ];
        let joined = join_sitemap(&urls);
        assert_eq!(joined, "https://example.com/ , https://example.com/about");
        assert_eq!(split_sitemap(&joined), urls);
        assert!(split_sitemap("").is_empty());
    }

    #[test]
    fn test_sender_parse() {
        assert_eq!(Sender::parse("user"), Some(Sender::User));
        assert_eq!(Sender::parse(Sender::Assistant.as_str()), Some(Sender::Assistant));
        assert_eq!(Sender::parse("bot"), None);
    }
}
