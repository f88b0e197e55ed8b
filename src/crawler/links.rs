//! Anchor extraction and internal-link filtering.

use crate::crawler::fetch::PageFetcher;
use crate::crawler::media::{is_media_path, is_media_url};
use crate::crawler::{CrawlError, SiteRoot, netloc_of};
use scraper::{Html, Selector};
use tracing::{debug, trace};
use url::Url;

/// Hrefs starting with these never point at another page
const SKIP_PREFIXES: [&str; 3] = ["#", "javascript:", "?"];

/// Raw `href` values of every anchor in `html`, in document order
pub fn extract_hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|anchor| anchor.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(String::from)
        .collect()
}

enum Href {
    Absolute(Url),
    Relative { path: String, query: Option<String> },
}

fn parse_href(href: &str, root: &SiteRoot) -> Option<Href> {
    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("{}://{}", root.scheme(), rest))
            .ok()
            .map(Href::Absolute);
    }
    match Url::parse(href) {
        Ok(url) => Some(Href::Absolute(url)),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let without_fragment = href.split('#').next().unwrap_or_default();
            let (path, query) = match without_fragment.split_once('?') {
                Some((path, query)) => (path, Some(query.to_string())),
                None => (without_fragment, None),
            };
            Some(Href::Relative {
                path: path.to_string(),
                query,
            })
        }
        Err(_) => None,
    }
}

/// Whether an href points at a crawlable page on the site.
///
/// Accepts same-host absolute links and relative paths other than `/`.
/// Rejects fragment-only, `javascript:` and query-only links as well as
/// media files.
pub fn is_internal_and_parsable(href: &str, root: &SiteRoot) -> bool {
    if SKIP_PREFIXES.iter().any(|prefix| href.starts_with(prefix)) {
        trace!(href, "Skipping non-page href");
        return false;
    }

    match parse_href(href, root) {
        Some(Href::Relative { path, .. }) => {
            !path.is_empty() && path != "/" && !is_media_path(&path)
        }
        Some(Href::Absolute(url)) => {
            !is_media_path(url.path()) && netloc_of(&url).as_deref() == Some(root.netloc())
        }
        None => false,
    }
}

/// Absolute URL for an href, relative paths resolved against the site root.
///
/// Fragments are dropped so `/a#x` and `/a` share one frontier entry.
pub fn resolve_against_root(href: &str, root: &SiteRoot) -> Option<String> {
    match parse_href(href, root)? {
        Href::Absolute(mut url) => {
            url.set_fragment(None);
            Some(url.to_string())
        }
        Href::Relative { path, query } => Some(match query {
            Some(query) => root.join(&format!("{}?{}", path, query)),
            None => root.join(&path),
        }),
    }
}

/// Fetches a page and lists its outbound hrefs
#[derive(Clone)]
pub struct LinkExtractor {
    fetcher: PageFetcher,
}

impl LinkExtractor {
    pub fn new(fetcher: PageFetcher) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &PageFetcher {
        &self.fetcher
    }

    /// Raw hrefs on the page at `url`; empty for media and unreachable pages
    pub async fn extract(&self, url: &str, root: &SiteRoot) -> Result<Vec<String>, CrawlError> {
        if is_media_url(url) {
            return Ok(Vec::new());
        }
        let html = self.fetcher.fetch_html(url, root).await?;
        let hrefs = extract_hrefs(&html);
        debug!(url, count = hrefs.len(), "Extracted links");
        Ok(hrefs)
    }

    /// Hrefs on the page at `url` that stay on the site, resolved to absolute URLs
    pub async fn internal_links(
        &self,
        url: &str,
        root: &SiteRoot,
    ) -> Result<Vec<String>, CrawlError> {
        let hrefs = self.extract(url, root).await?;
        Ok(hrefs
            .iter()
            .filter(|href| is_internal_and_parsable(href, root))
            .filter_map(|href| resolve_against_root(href, root))
            .collect())
    }
}
