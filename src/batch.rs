//! # Batch Indexing
//!
//! Builds the vector index of many sites one after another. Each site runs
//! under its own timeout; a site that times out or fails is recorded in the
//! report and the batch moves on. Nothing is retried within a run, and sites
//! already indexed by an earlier run are skipped when the report is reused.

use crate::crawler::SiteRoot;
use crate::error::{Error, Result};
use crate::index::{IndexBuilder, IndexKey};
use rig::embeddings::EmbeddingModel;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum BatchStatus {
    Indexed,
    Timeout,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub site: String,
    #[serde(flatten)]
    pub status: BatchStatus,
    pub seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    /// Load a report written by an earlier run, or an empty one
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }

    pub fn status_of(&self, site: &str) -> Option<&BatchStatus> {
        self.entries
            .iter()
            .find(|entry| entry.site == site)
            .map(|entry| &entry.status)
    }

    fn record(&mut self, entry: BatchEntry) {
        match self.entries.iter_mut().find(|e| e.site == entry.site) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }
}

/// Site roots from a text file: one per line, `#` starts a comment
pub async fn read_site_list(path: &Path) -> Result<Vec<String>> {
    let raw = tokio::fs::read_to_string(path).await?;
    Ok(raw
        .lines()
        .map(|line| line.split('#').next().unwrap_or("").trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

/// Index every site, saving the report at `report_path` after each one.
///
/// `on_site` is called with each finished entry.
#[instrument(skip(builder, sites, on_site), fields(sites = sites.len()))]
pub async fn run_batch<E: EmbeddingModel>(
    builder: &IndexBuilder<E>,
    sites: &[String],
    per_site_timeout: Duration,
    report_path: &Path,
    mut on_site: impl FnMut(&BatchEntry),
) -> Result<BatchReport> {
    let mut report = BatchReport::load_or_default(report_path).await?;

    for site in sites {
        if report.status_of(site) == Some(&BatchStatus::Indexed) {
            info!(site, "Already indexed, skipping");
            continue;
        }

        let started = Instant::now();
        let status = match SiteRoot::parse(site) {
            Err(e) => BatchStatus::Failed(e.to_string()),
            Ok(root) => {
                let key = IndexKey::Domain(root);
                match tokio::time::timeout(per_site_timeout, builder.build_or_load(&key)).await {
                    Ok(Ok(index)) => {
                        info!(site, nodes = index.len(), "Indexed, ready to use");
                        BatchStatus::Indexed
                    }
                    Ok(Err(e)) => {
                        warn!(site, error = %e, "Indexing failed");
                        BatchStatus::Failed(e.to_string())
                    }
                    Err(_) => {
                        warn!(site, timeout = ?per_site_timeout, "Indexing timed out");
                        BatchStatus::Timeout
                    }
                }
            }
        };

        let entry = BatchEntry {
            site: site.clone(),
            status,
            seconds: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        };
        on_site(&entry);
        report.record(entry);
        report
            .save(report_path)
            .await
            .map_err(|e| Error::Other(format!("Failed to write batch report: {}", e)))?;
    }

    Ok(report)
}
