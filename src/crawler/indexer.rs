//! # Page Indexer
//!
//! Turns a site into stored records: the `Domain` with its sitemap and rank
//! maps, and a `SiteUrl` per page carrying cached HTML and ranked text.

use crate::crawler::fetch::{PLACEHOLDER_HTML, PageFetcher};
use crate::crawler::links::{extract_hrefs, is_internal_and_parsable, resolve_against_root};
use crate::crawler::sitemap::SitemapBuilder;
use crate::crawler::text_rank::{ranked_text, text_fragments, update_textrank};
use crate::crawler::{CrawlError, DomainRefreshPolicy, SiteRoot};
use crate::store::{Domain, NewDomain, RankMap};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};

/// Per-key async locks serializing work on the same site or index.
///
/// Entries are never evicted; one small mutex per site or index key seen by
/// the process.
#[derive(Clone, Default)]
pub struct DomainLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DomainLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`; released when the guard drops
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

#[derive(Clone)]
pub struct PageIndexer {
    fetcher: PageFetcher,
    sitemaps: SitemapBuilder,
    locks: DomainLocks,
}

impl PageIndexer {
    pub fn new(fetcher: PageFetcher, locks: DomainLocks) -> Self {
        Self {
            sitemaps: SitemapBuilder::new(fetcher.clone()),
            fetcher,
            locks,
        }
    }

    pub fn sitemap_builder(&self) -> &SitemapBuilder {
        &self.sitemaps
    }

    /// Index every page of the site and return its `Domain` record.
    ///
    /// A page that cannot be fetched contributes empty text; it never aborts
    /// the run.
    #[instrument(skip(self), fields(site = %root))]
    pub async fn index(&self, root: &SiteRoot) -> Result<Domain, CrawlError> {
        let _guard = self.locks.lock(&format!("crawl:{}", root.netloc())).await;
        let started = Instant::now();
        let db = self.fetcher.database();
        let config = self.fetcher.config();

        if config.domain_refresh == DomainRefreshPolicy::Refresh {
            let cleared = db.clear_site_url_html(root.netloc()).await?;
            info!(cleared, "Refreshing site, cached html dropped");
        }

        let sitemap = self.sitemaps.build(root).await?;
        info!(pages = sitemap.urls.len(), source = ?sitemap.source, "Sitemap ready");

        let mut textrank = RankMap::new();
        let mut pagerank = RankMap::new();
        let mut pages: HashMap<&str, String> = HashMap::new();

        for url in &sitemap.urls {
            let html = self.fetcher.fetch_html(url, root).await?;

            let fragments = text_fragments(&html);
            update_textrank(&mut textrank, &fragments);
            pagerank.update(
                extract_hrefs(&html)
                    .iter()
                    .filter(|href| is_internal_and_parsable(href, root))
                    .filter_map(|href| resolve_against_root(href, root)),
            );

            let stored_html = (html != PLACEHOLDER_HTML).then_some(html.as_str());
            db.create_site_url_if_absent(url, root.netloc(), stored_html)
                .await?;
            pages.insert(url.as_str(), html);
        }

        let new_domain = NewDomain {
            domain: root.netloc().to_string(),
            sitemap: sitemap.urls.clone(),
            pagerank,
            textrank: textrank.clone(),
            time_to_index: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        };
        let domain = match config.domain_refresh {
            DomainRefreshPolicy::KeepExisting => db.create_domain_if_absent(&new_domain).await?,
            DomainRefreshPolicy::Refresh => db.refresh_domain(&new_domain).await?,
        };

        for url in &sitemap.urls {
            let html = match pages.get(url.as_str()) {
                Some(html) => html.clone(),
                None => self.fetcher.fetch_html(url, root).await?,
            };
            let text = ranked_text(&text_fragments(&html), &textrank, config.text_freq_limit);
            debug!(url, chars = text.len(), "Storing ranked text");
            db.update_site_url_text(url, &text).await?;
        }

        info!(
            pages = sitemap.urls.len(),
            seconds = started.elapsed().as_secs_f64(),
            "Site indexed"
        );
        Ok(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::CrawlerConfig;
    use crate::test_support::temp_database;
    use mockito::Server;

    const FOOTER: &str = "<footer><p>Copyright Expo</p></footer>";

    async fn site(server: &mut Server) {
        let page = |body: &str| format!("<html><body>{}{}</body></html>", body, FOOTER);
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(page(
                r#"<h1>Welcome</h1><a href="/about">About</a><a href="/tickets">Tickets</a><a href="/floor.pdf">Plan</a>"#,
            ))
            .create_async()
            .await;
        server
            .mock("GET", "/about")
            .with_status(200)
            .with_body(page("<p>Founded in 1999</p><ul><li>Halls A-C</li></ul>"))
            .create_async()
            .await;
        server
            .mock("GET", "/tickets")
            .with_status(500)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_index_site() {
        let mut server = Server::new_async().await;
        site(&mut server).await;

        let (db, _dir) = temp_database().await;
        // Footer appears on two pages, so a limit of 1 drops it
        let config = CrawlerConfig::builder().text_freq_limit(1).build();
        let fetcher = PageFetcher::new(db.clone(), config).unwrap();
        let indexer = PageIndexer::new(fetcher, DomainLocks::new());
        let root = SiteRoot::parse(&server.url()).unwrap();

        let domain = indexer.index(&root).await.unwrap();
        assert_eq!(domain.domain, root.netloc());
        assert_eq!(domain.sitemap.len(), 3);
        assert_eq!(domain.textrank.get("Copyright Expo"), 2);

        let home = db.get_site_url(&root.url()).await.unwrap().unwrap();
        assert_eq!(home.text.as_deref(), Some("\n\nWelcome:\n\nAbout\nTickets\nPlan"));

        let about = db.get_site_url(&root.join("about")).await.unwrap().unwrap();
        assert_eq!(about.text.as_deref(), Some("Founded in 1999\n- Halls A-C"));

        // The failed page is recorded with no html and empty text
        let tickets = db.get_site_url(&root.join("tickets")).await.unwrap().unwrap();
        assert!(tickets.html.is_none());
        assert_eq!(tickets.text.as_deref(), Some(""));

        assert_eq!(db.text_coverage(root.netloc()).await.unwrap(), (3, 0));
    }

    #[tokio::test]
    async fn test_reindex_keeps_existing_domain() {
        let mut server = Server::new_async().await;
        site(&mut server).await;

        let (db, _dir) = temp_database().await;
        let fetcher = PageFetcher::new(db.clone(), CrawlerConfig::default()).unwrap();
        let indexer = PageIndexer::new(fetcher, DomainLocks::new());
        let root = SiteRoot::parse(&server.url()).unwrap();

        let first = indexer.index(&root).await.unwrap();
        let second = indexer.index(&root).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(db.list_domains().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_finds_new_pages() {
        let mut server = Server::new_async().await;
        let home = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("<html><body><p>Coming soon</p></body></html>")
            .create_async()
            .await;

        let (db, _dir) = temp_database().await;
        let root = SiteRoot::parse(&server.url()).unwrap();
        let fetcher = PageFetcher::new(db.clone(), CrawlerConfig::default()).unwrap();
        let first = PageIndexer::new(fetcher, DomainLocks::new())
            .index(&root)
            .await
            .unwrap();
        assert_eq!(first.sitemap, vec![root.url()]);

        home.remove_async().await;
        server
            .mock("GET", "/")
            .with_status(200)
            .with_body(r#"<html><body><p>Now open</p><a href="/new">New</a></body></html>"#)
            .create_async()
            .await;
        server
            .mock("GET", "/new")
            .with_status(200)
            .with_body("<html><body><p>Programme</p></body></html>")
            .create_async()
            .await;

        // Keeping the existing record changes nothing
        let fetcher = PageFetcher::new(db.clone(), CrawlerConfig::default()).unwrap();
        let kept = PageIndexer::new(fetcher, DomainLocks::new())
            .index(&root)
            .await
            .unwrap();
        assert_eq!(kept.sitemap, vec![root.url()]);

        let config = CrawlerConfig::builder()
            .domain_refresh(DomainRefreshPolicy::Refresh)
            .build();
        let fetcher = PageFetcher::new(db.clone(), config).unwrap();
        let refreshed = PageIndexer::new(fetcher, DomainLocks::new())
            .index(&root)
            .await
            .unwrap();

        assert_eq!(refreshed.sitemap, vec![root.url(), root.join("new")]);
        assert_eq!(refreshed.pagerank.get(&root.join("new")), 1);
        assert_eq!(db.list_domains().await.unwrap().len(), 1);

        let stored_home = db.get_site_url(&root.url()).await.unwrap().unwrap();
        assert!(stored_home.html.unwrap().contains("Now open"));
        assert_eq!(stored_home.text.as_deref(), Some("Now open\nNew"));
        let new_page = db.get_site_url(&root.join("new")).await.unwrap().unwrap();
        assert_eq!(new_page.text.as_deref(), Some("Programme"));
    }

    #[tokio::test]
    async fn test_domain_locks_serialize_same_key() {
        let locks = DomainLocks::new();
        let guard = locks.lock("crawl:a").await;

        // A different key is independent
        let other = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.lock("crawl:b"),
        )
        .await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.lock("crawl:a"),
        )
        .await;
        assert!(same.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            locks.lock("crawl:a"),
        )
        .await;
        assert!(reacquired.is_ok());
    }
}
