//! # Website Crawler Module for RAG
//!
//! Discovers a site's pages, tallies how often each page is linked, fetches
//! and caches page HTML, and extracts the text worth indexing.
//!
//! ## Key Components
//!
//! - `SitemapBuilder`: declared sitemap discovery with a bounded crawl fallback
//! - `Frontier`: visited flags and inbound-link tallies during a crawl
//! - `PageFetcher` / `LinkExtractor`: cached, fault-tolerant page downloads
//! - `PageIndexer`: builds the `Domain` record and ranked text for every page
//!
//! ## Usage
//!
//! The crawler is the first step of the pipeline; the index builder reads the
//! ranked page text it stores.

mod config;
pub mod discovery;
mod error;
pub mod fetch;
pub mod frontier;
pub mod indexer;
pub mod links;
pub mod media;
pub mod sitemap;
pub mod text_rank;

pub use config::{CrawlerConfig, CrawlerConfigBuilder, DEFAULT_USER_AGENT, DomainRefreshPolicy};
pub use error::CrawlError;
pub use fetch::{PLACEHOLDER_HTML, PageFetcher};
pub use frontier::{Frontier, TraverseEntry};
pub use indexer::{DomainLocks, PageIndexer};
pub use links::LinkExtractor;
pub use media::is_media_url;
pub use sitemap::{SiteMap, SitemapBuilder, SitemapSource};

use std::fmt;
use url::Url;

/// Scheme and host of a site, with the root path `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteRoot {
    scheme: String,
    netloc: String,
}

impl SiteRoot {
    /// Parse a site root from any URL on the site. A bare host gets `https`.
    pub fn parse(input: &str) -> Result<Self, CrawlError> {
        let input = input.trim();
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };
        let parsed = Url::parse(&with_scheme)?;
        Self::from_url(&parsed)
    }

    pub fn from_url(url: &Url) -> Result<Self, CrawlError> {
        let netloc = netloc_of(url).ok_or_else(|| CrawlError::InvalidRoot(url.to_string()))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            netloc,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host with any explicit port, the unique key of a `Domain`
    pub fn netloc(&self) -> &str {
        &self.netloc
    }

    /// The root URL, always ending in `/`
    pub fn url(&self) -> String {
        format!("{}://{}/", self.scheme, self.netloc)
    }

    /// Absolute URL for a path on this site.
    ///
    /// `.` and `..` segments are resolved and any fragment is dropped; the
    /// query is kept.
    pub fn join(&self, path: &str) -> String {
        match Url::parse(&self.url()).and_then(|base| base.join(path)) {
            Ok(mut url) => {
                url.set_fragment(None);
                url.to_string()
            }
            Err(_) if path.starts_with('/') => format!("{}://{}{}", self.scheme, self.netloc, path),
            Err(_) => format!("{}://{}/{}", self.scheme, self.netloc, path),
        }
    }
}

impl fmt::Display for SiteRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url())
    }
}

/// `host[:port]` of a parsed URL
pub(crate) fn netloc_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_root_from_page_url() {
        let root = SiteRoot::parse("https://Example.com/events/2024?x=1#top").unwrap();
        assert_eq!(root.netloc(), "example.com");
        assert_eq!(root.url(), "https://example.com/");
        assert_eq!(root.join("about"), "https://example.com/about");
        assert_eq!(root.join("/about"), "https://example.com/about");
    }

    #[test]
    fn test_join_normalizes_dot_segments() {
        let root = SiteRoot::parse("https://example.com").unwrap();
        assert_eq!(root.join("./about"), "https://example.com/about");
        assert_eq!(root.join("/team/../about"), "https://example.com/about");
        assert_eq!(root.join("../../about"), "https://example.com/about");
        assert_eq!(root.join("news?page=2#latest"), "https://example.com/news?page=2");
    }

    #[test]
    fn test_site_root_keeps_port_and_defaults_scheme() {
        let root = SiteRoot::parse("http://127.0.0.1:8080/x").unwrap();
        assert_eq!(root.netloc(), "127.0.0.1:8080");

        let bare = SiteRoot::parse("example.org").unwrap();
        assert_eq!(bare.url(), "https://example.org/");
    }

    #[test]
    fn test_site_root_requires_host() {
        assert!(SiteRoot::parse("file:///tmp/site.html").is_err());
    }
}
