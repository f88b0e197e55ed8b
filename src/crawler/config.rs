//! # Crawler Configuration Module
//!
//! Limits and politeness settings for sitemap discovery, bounded crawling and
//! ranked-text extraction, with a builder for overriding individual values.

use std::time::Duration;

/// Browser-like user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

/// What to do with an existing `Domain` record when a site is indexed again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainRefreshPolicy {
    /// Leave the first record untouched; only page text is updated
    #[default]
    KeepExisting,
    /// Rediscover the site and fetch every page again, then overwrite
    /// sitemap and rank maps with the results of the new run
    Refresh,
}

/// Configuration for the crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// User agent to use for requests
    pub user_agent: String,

    /// Maximum number of crawl rounds
    pub recursion_depth_cutoff: u32,

    /// Upper bound on visited pages, and on declared sitemap size
    pub pagerank_ceiling: u64,

    /// Fragments seen more often than this across a site are dropped as boilerplate
    pub text_freq_limit: u64,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Delay in milliseconds before each network fetch
    pub rate_limit_ms: u64,

    pub domain_refresh: DomainRefreshPolicy,

    /// Maximum number of sitemap files fetched while expanding sitemap indexes
    pub max_sitemap_files: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            recursion_depth_cutoff: 3,
            pagerank_ceiling: 100,
            text_freq_limit: 4,
            request_timeout_secs: 30,
            rate_limit_ms: 0,
            domain_refresh: DomainRefreshPolicy::KeepExisting,
            max_sitemap_files: 20,
        }
    }
}

/// Builder for CrawlerConfig
#[derive(Debug, Default)]
pub struct CrawlerConfigBuilder {
    config: CrawlerConfig,
}

impl CrawlerConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the user agent to use for requests
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Set the maximum number of crawl rounds
    pub fn recursion_depth_cutoff(mut self, cutoff: u32) -> Self {
        self.config.recursion_depth_cutoff = cutoff;
        self
    }

    /// Set the visited-page and declared-sitemap ceiling
    pub fn pagerank_ceiling(mut self, ceiling: u64) -> Self {
        self.config.pagerank_ceiling = ceiling;
        self
    }

    /// Set the boilerplate frequency limit for ranked text
    pub fn text_freq_limit(mut self, limit: u64) -> Self {
        self.config.text_freq_limit = limit;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    /// Set the delay in milliseconds before each fetch
    pub fn rate_limit_ms(mut self, rate_limit_ms: u64) -> Self {
        self.config.rate_limit_ms = rate_limit_ms;
        self
    }

    pub fn domain_refresh(mut self, policy: DomainRefreshPolicy) -> Self {
        self.config.domain_refresh = policy;
        self
    }

    pub fn max_sitemap_files(mut self, max: usize) -> Self {
        self.config.max_sitemap_files = max;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CrawlerConfig {
        self.config
    }
}

impl CrawlerConfig {
    /// Create a new builder
    pub fn builder() -> CrawlerConfigBuilder {
        CrawlerConfigBuilder::new()
    }

    /// Get the rate limit as a Duration
    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
