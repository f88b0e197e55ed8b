//! Cached, fault-tolerant page downloads.
//!
//! Every failure mode of a single fetch degrades to `PLACEHOLDER_HTML` so a
//! bad page never aborts a crawl. Only record store errors are returned.

use crate::crawler::media::is_media_url;
use crate::crawler::{CrawlError, CrawlerConfig, SiteRoot};
use crate::store::Database;
use reqwest::Client;
use std::error::Error as StdError;
use tracing::{debug, instrument, warn};
use url::Url;

/// Body used for media URLs and pages that could not be fetched
pub const PLACEHOLDER_HTML: &str = "<html><head></head><body></body></html>";

/// Downloads pages, reusing and filling the `SiteUrl` HTML cache
#[derive(Clone)]
pub struct PageFetcher {
    client: Client,
    insecure_client: Client,
    db: Database,
    config: CrawlerConfig,
}

impl PageFetcher {
    pub fn new(db: Database, config: CrawlerConfig) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        let insecure_client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self {
            client,
            insecure_client,
            db,
            config,
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// HTML for `url`, from the cache when a non-empty body is stored.
    ///
    /// A URL without a scheme is resolved against `root` and cached under the
    /// resolved URL. Successful downloads are written back to the cache.
    #[instrument(skip(self, root), fields(root = %root))]
    pub async fn fetch_html(&self, url: &str, root: &SiteRoot) -> Result<String, CrawlError> {
        let (key, target) = match Url::parse(url) {
            Ok(parsed) => (url.to_string(), parsed.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let joined = root.join(url);
                debug!(joined = %joined, "Retrying relative url against site root");
                (joined.clone(), joined)
            }
            Err(e) => {
                warn!(error = %e, "Unparsable url, using placeholder");
                return Ok(PLACEHOLDER_HTML.to_string());
            }
        };

        let cached = self.db.get_site_url(&key).await?;
        if let Some(html) = cached.as_ref().and_then(|page| page.html.as_deref()) {
            if !html.is_empty() {
                debug!("Using cached html");
                return Ok(html.to_string());
            }
        }

        if is_media_url(&target) {
            debug!("Skipping media url");
            return Ok(PLACEHOLDER_HTML.to_string());
        }

        let Some(html) = self.download(&target).await else {
            return Ok(PLACEHOLDER_HTML.to_string());
        };

        match cached {
            Some(_) => self.db.update_site_url_html(&key, &html).await?,
            None => {
                self.db
                    .create_site_url_if_absent(&key, root.netloc(), Some(&html))
                    .await?;
            }
        }

        Ok(html)
    }

    /// Uncached GET for auxiliary files such as robots.txt and sitemaps
    pub async fn get_text(&self, url: &str) -> Option<String> {
        self.download(url).await
    }

    async fn download(&self, url: &str) -> Option<String> {
        if self.config.rate_limit_ms > 0 {
            tokio::time::sleep(self.config.rate_limit()).await;
        }

        match get_body(&self.client, url).await {
            Ok(body) => body,
            Err(e) if is_certificate_error(&e) => {
                warn!(url, error = %e, "Certificate validation failed, retrying without verification");
                match get_body(&self.insecure_client, url).await {
                    Ok(body) => body,
                    Err(e) => {
                        warn!(url, error = %e, "Insecure retry failed");
                        None
                    }
                }
            }
            Err(e) => {
                warn!(url, error = %e, "Fetch failed");
                None
            }
        }
    }
}

async fn get_body(client: &Client, url: &str) -> Result<Option<String>, reqwest::Error> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        debug!(url, %status, "Non-success status");
        return Ok(None);
    }
    Ok(Some(response.text().await?))
}

/// Whether any error in the chain reports a failed certificate check.
///
/// Matches on message text, since reqwest does not expose TLS failures as a
/// typed kind. Both native-tls ("certificate verify failed") and rustls
/// ("invalid peer certificate") mention the certificate; other handshake
/// failures such as protocol mismatches are not retried.
fn is_certificate_error(err: &(dyn StdError + 'static)) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(current) = source {
        if current.to_string().to_lowercase().contains("certificate") {
            return true;
        }
        source = current.source();
    }
    false
}
