//! # Index Builder
//!
//! Build-or-load for vector indexes. A persisted index for the key is loaded
//! as is; otherwise source text is gathered (crawling the site first when its
//! page records are missing or lack text), chunked, embedded and persisted.

use crate::crawler::{DomainLocks, PageIndexer, SiteRoot};
use crate::index::{IndexError, Node, SourceRef, VectorIndex, vector_store};
use crate::processor::document::read_document;
use crate::processor::{ProcessorConfig, SourceDocument, process_documents};
use crate::store::Database;
use rig::embeddings::EmbeddingModel;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// What an index is built over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexKey {
    /// Every stored page text of a crawled site
    Domain(SiteRoot),
    /// A form-feed paginated text file under the documents directory
    Document {
        filename: String,
        start_skip: usize,
        end_skip: usize,
    },
}

impl IndexKey {
    /// Directory name for the persisted index.
    ///
    /// Prefixed with the key kind so a host and a document never share a
    /// directory. Names made only of dots are rejected.
    pub fn storage_name(&self) -> Result<String, IndexError> {
        let (kind, raw) = match self {
            IndexKey::Domain(root) => ("site", root.netloc()),
            IndexKey::Document { filename, .. } => ("doc", filename.as_str()),
        };
        if raw.chars().all(|c| c == '.') {
            return Err(IndexError::InvalidKey(raw.to_string()));
        }
        let sanitized: String = raw
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        Ok(format!("{}-{}", kind, sanitized))
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Domain(root) => f.write_str(root.netloc()),
            IndexKey::Document { filename, .. } => f.write_str(filename),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory holding one sub-directory per index key
    pub root: PathBuf,
    /// Where document keys are read from
    pub documents_dir: PathBuf,
    /// Re-crawl when more than this fraction of page records lack text
    pub max_missing_text_fraction: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/rag-index"),
            documents_dir: PathBuf::from("data"),
            max_missing_text_fraction: 0.0,
        }
    }
}

pub struct IndexBuilder<E: EmbeddingModel> {
    model: E,
    indexer: PageIndexer,
    db: Database,
    locks: DomainLocks,
    config: IndexConfig,
    processor: ProcessorConfig,
}

impl<E: EmbeddingModel> IndexBuilder<E> {
    pub fn new(model: E, indexer: PageIndexer, db: Database) -> Self {
        Self {
            model,
            indexer,
            db,
            locks: DomainLocks::new(),
            config: IndexConfig::default(),
            processor: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: IndexConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_processor_config(mut self, processor: ProcessorConfig) -> Self {
        self.processor = processor;
        self
    }

    /// Share locks with other builders so one key is built at a time
    pub fn with_locks(mut self, locks: DomainLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn index_dir(&self, key: &IndexKey) -> Result<PathBuf, IndexError> {
        Ok(self.config.root.join(key.storage_name()?))
    }

    /// Load the persisted index for `key`, building it first if needed
    #[instrument(skip(self, key), fields(key = %key))]
    pub async fn build_or_load(&self, key: &IndexKey) -> Result<VectorIndex, IndexError> {
        let dir = self.index_dir(key)?;
        let _guard = self.locks.lock(&format!("index:{}", key.storage_name()?)).await;

        if vector_store::index_exists(&dir) {
            info!(dir = %dir.display(), "Loading existing index");
            return vector_store::load(&key.to_string(), &dir).await;
        }

        let documents = self.gather(key).await?;
        if documents.is_empty() {
            return Err(IndexError::NoSourceText {
                key: key.to_string(),
            });
        }

        let chunks = process_documents(&self.model, &documents, &self.processor).await?;
        let index = VectorIndex::new(key.to_string(), chunks.into_iter().map(Node::from).collect());
        vector_store::persist(&index, &dir).await?;
        info!(nodes = index.len(), "Built index");
        Ok(index)
    }

    async fn gather(&self, key: &IndexKey) -> Result<Vec<SourceDocument>, IndexError> {
        match key {
            IndexKey::Domain(root) => self.gather_domain(root).await,
            IndexKey::Document {
                filename,
                start_skip,
                end_skip,
            } => {
                let path = self.config.documents_dir.join(filename);
                Ok(read_document(&path, *start_skip, *end_skip).await?)
            }
        }
    }

    async fn gather_domain(&self, root: &SiteRoot) -> Result<Vec<SourceDocument>, IndexError> {
        let (total, missing) = self.db.text_coverage(root.netloc()).await?;
        let missing_fraction = if total == 0 {
            1.0
        } else {
            missing as f64 / total as f64
        };

        if total == 0 || missing_fraction > self.config.max_missing_text_fraction {
            info!(total, missing, "Page text incomplete, indexing site");
            self.indexer.index(root).await?;
        }

        let documents: Vec<SourceDocument> = self
            .db
            .list_site_urls_by_domain(root.netloc())
            .await?
            .into_iter()
            .filter_map(|page| {
                let text = page.text?;
                (!text.trim().is_empty()).then(|| SourceDocument {
                    source: SourceRef::Url(page.url),
                    text,
                })
            })
            .collect();

        if documents.is_empty() {
            warn!(site = %root, "Site has no usable page text");
        }
        Ok(documents)
    }
}
