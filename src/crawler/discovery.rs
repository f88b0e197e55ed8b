//! Declared sitemap discovery: robots.txt references, well-known sitemap
//! locations and nested sitemap indexes.

use crate::crawler::fetch::PageFetcher;
use crate::crawler::{CrawlError, SiteRoot};
use quick_xml::Reader;
use quick_xml::events::Event;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, info, instrument};

/// Locations that often hold a sitemap without being listed in robots.txt
pub const CANDIDATE_PATHS: [&str; 7] = [
    "sitemap.xml",
    "sitemap_index.xml",
    "sitemap-index.xml",
    ".sitemap.xml",
    "sitemap",
    "admin/config/search/xmlsitemap",
    "sitemap/sitemap-index.xml",
];

/// A parsed sitemap file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<urlset>` or a plain-text list: page URLs
    UrlSet(Vec<String>),
    /// `<sitemapindex>`: locations of further sitemap files
    Index(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct Loc {
    loc: String,
}

#[derive(Debug, Deserialize)]
struct UrlSet {
    #[serde(rename = "url", default)]
    urls: Vec<Loc>,
}

#[derive(Debug, Deserialize)]
struct SitemapIndex {
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<Loc>,
}

/// Sitemap URLs listed in a robots.txt body
pub fn parse_robots_sitemaps(robots: &str) -> Result<Vec<String>, CrawlError> {
    let line = Regex::new(r"(?im)^\s*sitemap\s*:\s*(\S+)")
        .map_err(|e| CrawlError::Other(format!("Invalid robots pattern: {}", e)))?;
    Ok(line
        .captures_iter(robots)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect())
}

fn root_element(xml: &str) -> Result<Option<String>, CrawlError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                return Ok(Some(name));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => continue,
            Err(e) => return Err(CrawlError::SitemapParse(e.to_string())),
        }
    }
}

fn locs(entries: Vec<Loc>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.loc.trim().to_string())
        .filter(|loc| !loc.is_empty())
        .collect()
}

/// Parse a sitemap body. Returns `None` when the body is not a sitemap,
/// such as an HTML page served at a candidate location.
pub fn parse_sitemap(body: &str) -> Result<Option<SitemapDocument>, CrawlError> {
    let trimmed = body.trim_start_matches('\u{feff}').trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    if !trimmed.starts_with('<') {
        let urls: Vec<String> = trimmed
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("http://") || line.starts_with("https://"))
            .filter(|line| url::Url::parse(line).is_ok())
            .map(String::from)
            .collect();
        return Ok((!urls.is_empty()).then_some(SitemapDocument::UrlSet(urls)));
    }

    match root_element(trimmed)?.as_deref() {
        Some("urlset") => {
            let set: UrlSet = quick_xml::de::from_str(trimmed)
                .map_err(|e| CrawlError::SitemapParse(e.to_string()))?;
            Ok(Some(SitemapDocument::UrlSet(locs(set.urls))))
        }
        Some("sitemapindex") => {
            let index: SitemapIndex = quick_xml::de::from_str(trimmed)
                .map_err(|e| CrawlError::SitemapParse(e.to_string()))?;
            Ok(Some(SitemapDocument::Index(locs(index.sitemaps))))
        }
        _ => Ok(None),
    }
}

/// Finds the page URLs a site declares through sitemap files
#[derive(Clone)]
pub struct SitemapDiscovery {
    fetcher: PageFetcher,
}

impl SitemapDiscovery {
    pub fn new(fetcher: PageFetcher) -> Self {
        Self { fetcher }
    }

    /// Declared page URLs, deduplicated in discovery order. Empty when the
    /// site declares none.
    #[instrument(skip(self), fields(site = %root))]
    pub async fn discover(&self, root: &SiteRoot) -> Result<Vec<String>, CrawlError> {
        let mut queue: VecDeque<String> = VecDeque::new();
        let mut queued: HashSet<String> = HashSet::new();

        if let Some(robots) = self.fetcher.get_text(&root.join("robots.txt")).await {
            for location in parse_robots_sitemaps(&robots)? {
                if queued.insert(location.clone()) {
                    queue.push_back(location);
                }
            }
        }
        for path in CANDIDATE_PATHS {
            let location = root.join(path);
            if queued.insert(location.clone()) {
                queue.push_back(location);
            }
        }

        let max_files = self.fetcher.config().max_sitemap_files;
        let mut fetched = 0usize;
        let mut seen_pages: HashSet<String> = HashSet::new();
        let mut pages = Vec::new();

        while let Some(location) = queue.pop_front() {
            if fetched >= max_files {
                info!(max_files, "Sitemap file limit reached");
                break;
            }
            if location.ends_with(".gz") {
                debug!(location, "Skipping compressed sitemap");
                continue;
            }

            fetched += 1;
            let Some(body) = self.fetcher.get_text(&location).await else {
                continue;
            };

            match parse_sitemap(&body) {
                Ok(Some(SitemapDocument::UrlSet(urls))) => {
                    debug!(location, count = urls.len(), "Found url set");
                    for url in urls {
                        if seen_pages.insert(url.clone()) {
                            pages.push(url);
                        }
                    }
                }
                Ok(Some(SitemapDocument::Index(children))) => {
                    debug!(location, count = children.len(), "Found sitemap index");
                    for child in children {
                        if queued.insert(child.clone()) {
                            queue.push_back(child);
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(location, error = %e, "Ignoring malformed sitemap"),
            }
        }

        info!(count = pages.len(), "Declared sitemap discovery finished");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlerConfig;
    use crate::test_support::temp_database;
    use mockito::Server;

    #[test]
    fn test_parse_robots() {
        let robots = "User-agent: *\nDisallow: /admin\nSitemap: https://a.org/sitemap_a.xml\n  sitemap:https://a.org/b.xml\n";
        assert_eq!(
            parse_robots_sitemaps(robots).unwrap(),
            vec!["https://a.org/sitemap_a.xml", "https://a.org/b.xml"]
        );
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://a.org/</loc><lastmod>2024-01-01</lastmod></url>
  <url><loc>
    https://a.org/about
  </loc></url>
</urlset>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            Some(SitemapDocument::UrlSet(vec![
                "https://a.org/".to_string(),
                "https://a.org/about".to_string()
            ]))
        );
    }

    #[test]
    fn test_parse_index_and_non_sitemaps() {
        let xml = r#"<sitemapindex><sitemap><loc>https://a.org/s1.xml</loc></sitemap></sitemapindex>"#;
        assert_eq!(
            parse_sitemap(xml).unwrap(),
            Some(SitemapDocument::Index(vec!["https://a.org/s1.xml".to_string()]))
        );

        assert_eq!(parse_sitemap("<html><body>Site map</body></html>").unwrap(), None);
        assert_eq!(parse_sitemap("").unwrap(), None);
        assert_eq!(
            parse_sitemap("https://a.org/x\nnot a url\n").unwrap(),
            Some(SitemapDocument::UrlSet(vec!["https://a.org/x".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_discover_follows_robots_and_indexes() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body(format!("Sitemap: {}/main-index.xml\n", base))
            .create_async()
            .await;
        server
            .mock("GET", "/main-index.xml")
            .with_status(200)
            .with_body(format!(
                "<sitemapindex><sitemap><loc>{0}/pages.xml</loc></sitemap><sitemap><loc>{0}/old.xml.gz</loc></sitemap></sitemapindex>",
                base
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/pages.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset><url><loc>{0}/</loc></url><url><loc>{0}/about</loc></url></urlset>",
                base
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!("<urlset><url><loc>{0}/about</loc></url></urlset>", base))
            .create_async()
            .await;
        let gz = server
            .mock("GET", "/old.xml.gz")
            .expect(0)
            .create_async()
            .await;

        let (db, _dir) = temp_database().await;
        let fetcher = PageFetcher::new(db, CrawlerConfig::default()).unwrap();
        let discovery = SitemapDiscovery::new(fetcher);
        let root = SiteRoot::parse(&base).unwrap();

        let pages = discovery.discover(&root).await.unwrap();
        assert_eq!(pages, vec![format!("{}/about", base), format!("{}/", base)]);
        gz.assert_async().await;
    }

    #[tokio::test]
    async fn test_discover_nothing_declared() {
        let server = Server::new_async().await;
        let (db, _dir) = temp_database().await;
        let fetcher = PageFetcher::new(db, CrawlerConfig::default()).unwrap();
        let discovery = SitemapDiscovery::new(fetcher);
        let root = SiteRoot::parse(&server.url()).unwrap();

        assert!(discovery.discover(&root).await.unwrap().is_empty());
    }
}
