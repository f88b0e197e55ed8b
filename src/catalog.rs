//! # Subject Catalog
//!
//! The known subjects a chat can be about, each backed by an index source,
//! and classification of a query into one of them by the completion model.

use crate::crawler::SiteRoot;
use crate::error::Error as CrateError;
use crate::index::IndexKey;
use rig::completion::{AssistantContent, CompletionError, CompletionModel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

const CLASSIFICATION_PREAMBLE: &str = "You classify questions by the subject they are about. \
Reply with only the exact name of one subject from the list, or `unknown` if none fits.";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Classification failed: {0}")]
    Classification(#[from] CompletionError),
}

impl From<CatalogError> for CrateError {
    fn from(err: CatalogError) -> Self {
        CrateError::Catalog(err.to_string())
    }
}

/// Where a subject's index is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubjectSource {
    Site {
        root: String,
    },
    Document {
        filename: String,
        #[serde(default)]
        start_skip: usize,
        #[serde(default)]
        end_skip: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub description: String,
    pub source: SubjectSource,
}

impl Subject {
    pub fn index_key(&self) -> Result<IndexKey, CatalogError> {
        match &self.source {
            SubjectSource::Site { root } => SiteRoot::parse(root)
                .map(IndexKey::Domain)
                .map_err(|e| CatalogError::InvalidSubject(format!("{}: {}", self.name, e))),
            SubjectSource::Document {
                filename,
                start_skip,
                end_skip,
            } => Ok(IndexKey::Document {
                filename: filename.clone(),
                start_skip: *start_skip,
                end_skip: *end_skip,
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub subjects: Vec<Subject>,
}

impl Catalog {
    pub fn new(subjects: Vec<Subject>) -> Result<Self, CatalogError> {
        let catalog = Self { subjects };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog from a JSON file
    pub async fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let catalog: Catalog = serde_json::from_str(&raw)?;
        catalog.validate()?;
        info!(path = %path.display(), subjects = catalog.subjects.len(), "Loaded catalog");
        Ok(catalog)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let mut names = HashSet::new();
        for subject in &self.subjects {
            if subject.name.trim().is_empty() {
                return Err(CatalogError::InvalidSubject("empty subject name".to_string()));
            }
            if !names.insert(normalize_name(&subject.name)) {
                return Err(CatalogError::InvalidSubject(format!(
                    "duplicate subject '{}'",
                    subject.name
                )));
            }
            subject.index_key()?;
        }
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.subjects.iter().map(|s| s.name.as_str()).collect()
    }

    /// Subject by name, ignoring case, surrounding quotes and a final period
    pub fn find(&self, name: &str) -> Option<&Subject> {
        let wanted = normalize_name(name);
        self.subjects
            .iter()
            .find(|subject| normalize_name(&subject.name) == wanted)
    }

    pub fn classification_prompt(&self, query: &str) -> String {
        let subjects = self
            .subjects
            .iter()
            .map(|s| format!("- {}: {}", s.name, s.description.trim()))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Subjects:\n{}\n\nQuestion: {}\n\nSubject:", subjects, query)
    }

    /// Ask the model which subject `query` is about
    #[instrument(skip(self, model))]
    pub async fn classify<C: CompletionModel>(
        &self,
        model: &C,
        query: &str,
    ) -> Result<Option<&Subject>, CatalogError> {
        let response = model
            .completion_request(self.classification_prompt(query))
            .preamble(CLASSIFICATION_PREAMBLE.to_string())
            .send()
            .await?;

        let reply = response
            .choice
            .iter()
            .map(|content| match content {
                AssistantContent::Text(text) => text.text.clone(),
                _ => "".to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        debug!(reply = reply.trim(), "Classification reply");
        Ok(self.find(&reply))
    }

    /// Informational reply for a query matching no known subject
    pub fn unknown_subject_response(&self) -> String {
        [
            "Sorry, I cannot seem to find what you are asking about in my database.".to_string(),
            format!(
                "I only have information about the following: {}",
                self.names().join(", ")
            ),
            "Please try again. It may help to give any identifying information about what you are asking about."
                .to_string(),
        ]
        .join("\n\n")
    }
}

fn normalize_name(name: &str) -> String {
    name.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim_end_matches('.')
        .trim()
        .to_lowercase()
}
