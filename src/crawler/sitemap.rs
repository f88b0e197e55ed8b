//! # Sitemap Builder
//!
//! Produces a site's ordered URL list and inbound-link tallies. A stored
//! `Domain` short-circuits everything unless the refresh policy asks for
//! rediscovery; otherwise declared sitemaps are used when they are small
//! enough, and a bounded crawl from the root otherwise.

use crate::crawler::discovery::SitemapDiscovery;
use crate::crawler::fetch::PageFetcher;
use crate::crawler::frontier::Frontier;
use crate::crawler::links::{LinkExtractor, is_internal_and_parsable, resolve_against_root};
use crate::crawler::media::is_media_url;
use crate::crawler::{CrawlError, DomainRefreshPolicy, SiteRoot};
use crate::store::RankMap;
use tracing::{debug, info, instrument};
use url::Url;

/// Where a sitemap came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitemapSource {
    /// Persisted `Domain` record, no network access
    Stored,
    /// Sitemap files published by the site
    Declared,
    /// Bounded crawl from the site root
    Crawled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SiteMap {
    pub urls: Vec<String>,
    pub pagerank: RankMap,
    pub source: SitemapSource,
}

#[derive(Clone)]
pub struct SitemapBuilder {
    links: LinkExtractor,
    discovery: SitemapDiscovery,
}

impl SitemapBuilder {
    pub fn new(fetcher: PageFetcher) -> Self {
        Self {
            links: LinkExtractor::new(fetcher.clone()),
            discovery: SitemapDiscovery::new(fetcher),
        }
    }

    fn fetcher(&self) -> &PageFetcher {
        self.links.fetcher()
    }

    /// Sitemap and pagerank for the site. Persists nothing.
    #[instrument(skip(self), fields(site = %root))]
    pub async fn build(&self, root: &SiteRoot) -> Result<SiteMap, CrawlError> {
        if self.fetcher().config().domain_refresh == DomainRefreshPolicy::KeepExisting {
            if let Some(domain) = self.fetcher().database().get_domain(root.netloc()).await? {
                info!("Using stored sitemap");
                return Ok(SiteMap {
                    urls: domain.sitemap,
                    pagerank: domain.pagerank,
                    source: SitemapSource::Stored,
                });
            }
        }

        let ceiling = self.fetcher().config().pagerank_ceiling;
        let declared = self.discovery.discover(root).await?;
        if !declared.is_empty() {
            if (declared.len() as u64) < ceiling {
                info!(count = declared.len(), "Building pagerank from declared sitemap");
                let pagerank = self.pagerank_from_declared(&declared).await?;
                return Ok(SiteMap {
                    urls: declared,
                    pagerank,
                    source: SitemapSource::Declared,
                });
            }
            info!(
                count = declared.len(),
                ceiling, "Declared sitemap too large, crawling instead"
            );
        }

        let (urls, pagerank) = self.crawl(root).await?;
        Ok(SiteMap {
            urls,
            pagerank,
            source: SitemapSource::Crawled,
        })
    }

    /// Tally internal link targets across declared pages.
    ///
    /// Stops at the first page after which any target exceeds the ceiling,
    /// so large sites get a partial tally.
    pub async fn pagerank_from_declared(&self, urls: &[String]) -> Result<RankMap, CrawlError> {
        let ceiling = self.fetcher().config().pagerank_ceiling;
        let mut pagerank = RankMap::new();

        for (position, url) in urls.iter().enumerate() {
            if is_media_url(url) {
                continue;
            }
            let Some(page_root) = Url::parse(url)
                .ok()
                .and_then(|parsed| SiteRoot::from_url(&parsed).ok())
            else {
                debug!(url, "Skipping unparsable sitemap entry");
                continue;
            };

            let hrefs = self.links.extract(url, &page_root).await?;
            pagerank.update(
                hrefs
                    .iter()
                    .filter(|href| is_internal_and_parsable(href, &page_root))
                    .filter_map(|href| resolve_against_root(href, &page_root)),
            );

            if pagerank.max() > ceiling {
                info!(
                    skipped = urls.len() - position - 1,
                    "Pagerank ceiling exceeded, stopping tally"
                );
                break;
            }
        }

        Ok(pagerank)
    }

    /// Bounded crawl from the site root, most-linked pages first each round
    #[instrument(skip(self), fields(site = %root))]
    pub async fn crawl(&self, root: &SiteRoot) -> Result<(Vec<String>, RankMap), CrawlError> {
        let config = self.fetcher().config();
        let cutoff = config.recursion_depth_cutoff;
        let ceiling = config.pagerank_ceiling;

        let mut frontier = Frontier::seeded(root.url());
        let mut depth = 0;

        while !frontier.all_visited() && depth < cutoff && frontier.visited_count() < ceiling {
            let pending = frontier.unvisited_by_rank();
            debug!(depth, pending = pending.len(), visited = frontier.visited_count(), "Crawl round");

            for url in pending {
                for link in self.links.internal_links(&url, root).await? {
                    frontier.add_reference(link);
                }
                frontier.mark_visited(&url);

                if frontier.visited_count() >= ceiling {
                    info!(visited = frontier.visited_count(), "Visit ceiling reached");
                    break;
                }
            }
            depth += 1;
        }

        let discovered = frontier.len();
        let (urls, pagerank) = frontier.into_visited();
        info!(
            visited = urls.len(),
            discarded = discovered - urls.len(),
            "Crawl finished"
        );
        Ok((urls, pagerank))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlerConfig;
    use crate::store::NewDomain;
    use crate::test_support::temp_database;
    use mockito::{Matcher, Server};

    async fn make_builder(config: CrawlerConfig) -> (SitemapBuilder, crate::store::Database, tempfile::TempDir) {
        let (db, dir) = temp_database().await;
        let fetcher = PageFetcher::new(db.clone(), config).unwrap();
        (SitemapBuilder::new(fetcher), db, dir)
    }

    #[tokio::test]
    async fn test_same_host_variants_fold_into_one_entry() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(format!(
                r#"<a href="/about">1</a><a href="{}/about">2</a><a href="http://other.com/x">3</a>"#,
                base
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/about")
            .with_status(200)
            .with_body("<p>About</p>")
            .create_async()
            .await;

        let (builder, _db, _dir) = make_builder(CrawlerConfig::default()).await;
        let root = SiteRoot::parse(&base).unwrap();
        let (urls, pagerank) = builder.crawl(&root).await.unwrap();

        let about = format!("{}/about", base);
        assert_eq!(urls, vec![root.url(), about.clone()]);
        assert_eq!(pagerank.get(&about), 2);
        assert_eq!(pagerank.get("http://other.com/x"), 0);
    }

    #[tokio::test]
    async fn test_dot_segment_links_fold_into_one_entry() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(
                r#"<a href="/about">1</a><a href="./about">2</a><a href="/team/../about">3</a>"#,
            )
            .create_async()
            .await;
        let about_page = server
            .mock("GET", "/about")
            .with_status(200)
            .with_body("<p>About</p>")
            .expect(1)
            .create_async()
            .await;

        let (builder, _db, _dir) = make_builder(CrawlerConfig::default()).await;
        let root = SiteRoot::parse(&base).unwrap();
        let (urls, pagerank) = builder.crawl(&root).await.unwrap();

        let about = format!("{}/about", base);
        assert_eq!(urls, vec![root.url(), about.clone()]);
        assert_eq!(pagerank.get(&about), 3);
        about_page.assert_async().await;
    }

    #[tokio::test]
    async fn test_crawl_respects_depth_and_ceiling() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<a href="/a">a</a><a href="/b">b</a><a href="/b">b</a>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/b")
            .with_status(200)
            .with_body(r#"<a href="/c">c</a>"#)
            .create_async()
            .await;
        let not_visited = server
            .mock("GET", "/a")
            .expect(0)
            .create_async()
            .await;

        // Two visits allowed: the root, then /b which outranks /a
        let config = CrawlerConfig::builder().pagerank_ceiling(2).build();
        let (builder, _db, _dir) = make_builder(config).await;
        let root = SiteRoot::parse(&base).unwrap();
        let (urls, pagerank) = builder.crawl(&root).await.unwrap();

        assert_eq!(urls, vec![root.url(), format!("{}/b", base)]);
        assert_eq!(pagerank.get(&format!("{}/b", base)), 2);
        not_visited.assert_async().await;

        // One round only visits the root
        let config = CrawlerConfig::builder().recursion_depth_cutoff(1).build();
        let (builder, _db, _dir) = make_builder(config).await;
        let (urls, _) = builder.crawl(&root).await.unwrap();
        assert_eq!(urls, vec![root.url()]);
    }

    #[tokio::test]
    async fn test_large_declared_sitemap_falls_back_to_crawl() {
        let mut server = Server::new_async().await;
        let base = server.url();
        let entries: String = (0..150)
            .map(|i| format!("<url><loc>{}/page-{}</loc></url>", base, i))
            .collect();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!("<urlset>{}</urlset>", entries))
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<a href="/about">About</a>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/about")
            .with_status(200)
            .with_body("<p>About</p>")
            .create_async()
            .await;

        let (builder, _db, _dir) = make_builder(CrawlerConfig::default()).await;
        let root = SiteRoot::parse(&base).unwrap();
        let sitemap = builder.build(&root).await.unwrap();

        assert_eq!(sitemap.source, SitemapSource::Crawled);
        assert_eq!(sitemap.urls, vec![root.url(), format!("{}/about", base)]);
    }

    #[tokio::test]
    async fn test_small_declared_sitemap_is_used() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/sitemap.xml")
            .with_status(200)
            .with_body(format!(
                "<urlset><url><loc>{0}/</loc></url><url><loc>{0}/about</loc></url></urlset>",
                base
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<a href="/about">About</a>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/about")
            .with_status(200)
            .with_body(r#"<a href="/about">Self</a><a href="/">Home</a>"#)
            .create_async()
            .await;

        let (builder, _db, _dir) = make_builder(CrawlerConfig::default()).await;
        let root = SiteRoot::parse(&base).unwrap();
        let sitemap = builder.build(&root).await.unwrap();

        assert_eq!(sitemap.source, SitemapSource::Declared);
        assert_eq!(sitemap.urls.len(), 2);
        assert_eq!(sitemap.pagerank.get(&format!("{}/about", base)), 2);
        // "/" is never counted as an internal target
        assert_eq!(sitemap.pagerank.get(&format!("{}/", base)), 0);
    }

    #[tokio::test]
    async fn test_stored_domain_skips_network() {
        let mut server = Server::new_async().await;
        let any = server
            .mock("GET", Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let (builder, db, _dir) = make_builder(CrawlerConfig::default()).await;
        let root = SiteRoot::parse(&server.url()).unwrap();
        let mut pagerank = RankMap::new();
        pagerank.insert(root.url(), 4);
        db.create_domain_if_absent(&NewDomain {
            domain: root.netloc().to_string(),
            sitemap: vec![root.url(), root.join("about")],
            pagerank,
            ..Default::default()
        })
        .await
        .unwrap();

        let first = builder.build(&root).await.unwrap();
        let second = builder.build(&root).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.source, SitemapSource::Stored);
        assert_eq!(first.urls, vec![root.url(), root.join("about")]);
        assert_eq!(first.pagerank.get(&root.url()), 4);
        any.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_policy_rediscovers_stored_domain() {
        let mut server = Server::new_async().await;
        let base = server.url();
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<a href="/new">New</a>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/new")
            .with_status(200)
            .with_body("<p>New</p>")
            .create_async()
            .await;

        let config = CrawlerConfig::builder()
            .domain_refresh(DomainRefreshPolicy::Refresh)
            .build();
        let (builder, db, _dir) = make_builder(config).await;
        let root = SiteRoot::parse(&base).unwrap();
        db.create_domain_if_absent(&NewDomain {
            domain: root.netloc().to_string(),
            sitemap: vec![root.url()],
            ..Default::default()
        })
        .await
        .unwrap();

        let sitemap = builder.build(&root).await.unwrap();
        assert_eq!(sitemap.source, SitemapSource::Crawled);
        assert_eq!(sitemap.urls, vec![root.url(), format!("{}/new", base)]);
    }
}
