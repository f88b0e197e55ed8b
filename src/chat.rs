//! # Chat Service
//!
//! One turn of a conversation: classify the query's subject, build or load
//! that subject's index, answer with two-stage retrieval, and persist both
//! messages. Each conversation's state is loaded from the record store by id
//! for every turn.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::index::IndexBuilder;
use crate::search::Retriever;
use crate::store::{Database, DbError, Sender, StoredMessage};
use rig::completion::CompletionModel;
use rig::embeddings::EmbeddingModel;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, instrument};

/// Persisted state of one conversation
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: i64,
    pub subject: Option<String>,
    pub history: Vec<StoredMessage>,
}

impl Conversation {
    pub async fn load(db: &Database, id: i64) -> Result<Self> {
        let record = db
            .get_conversation(id)
            .await?
            .ok_or(DbError::NotFound(format!("conversation {}", id)))?;
        Ok(Self {
            id,
            subject: record.subject,
            history: db.list_messages(id).await?,
        })
    }

    pub async fn start(db: &Database) -> Result<Self> {
        let id = db.create_conversation(None).await?;
        Ok(Self {
            id,
            subject: None,
            history: Vec::new(),
        })
    }

    /// Prior turns as `user:`/`assistant:` blocks, oldest first
    pub fn transcript(&self) -> String {
        self.history
            .iter()
            .map(|message| format!("{}:\n{}", message.sender.as_str(), message.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub conversation_id: i64,
    pub response: String,
    /// Subject the query was classified under, `None` when unknown
    pub subject: Option<String>,
    /// Distinct sources joined by `", "`
    pub sources: Option<String>,
    pub response_time: f64,
}

pub struct ChatService<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    db: Database,
    catalog: Catalog,
    indexes: IndexBuilder<E>,
    retriever: Retriever<C, E>,
}

impl<C, E> ChatService<C, E>
where
    C: CompletionModel,
    E: EmbeddingModel,
{
    pub fn new(
        db: Database,
        catalog: Catalog,
        indexes: IndexBuilder<E>,
        retriever: Retriever<C, E>,
    ) -> Self {
        Self {
            db,
            catalog,
            indexes,
            retriever,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Answer `query`, continuing `conversation_id` or starting a new one
    #[instrument(skip(self))]
    pub async fn ask(&self, conversation_id: Option<i64>, query: &str) -> Result<ChatResponse> {
        let started = Instant::now();
        let conversation = match conversation_id {
            Some(id) => Conversation::load(&self.db, id).await?,
            None => Conversation::start(&self.db).await?,
        };

        let classified = self
            .catalog
            .classify(self.retriever.client().completion(), query)
            .await?;
        let subject = match classified {
            Some(subject) => Some(subject),
            // A follow-up without a recognizable subject stays on topic
            None => conversation
                .subject
                .as_deref()
                .and_then(|name| self.catalog.find(name)),
        };

        let (response, subject_name, sources) = match subject {
            None => {
                info!("Query matched no known subject");
                (self.catalog.unknown_subject_response(), None, None)
            }
            Some(subject) => {
                let index = self.indexes.build_or_load(&subject.index_key()?).await?;
                let answer = self
                    .retriever
                    .query_with_history(&index, query, &conversation.transcript())
                    .await?;
                let sources = answer
                    .sources
                    .iter()
                    .map(|source| source.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                (
                    format!("You seem to be asking about {}.\n\n{}", subject.name, answer.text),
                    Some(subject.name.clone()),
                    Some(sources),
                )
            }
        };

        if let Some(name) = &subject_name {
            if conversation.subject.as_deref() != Some(name.as_str()) {
                self.db.set_conversation_subject(conversation.id, name).await?;
            }
        }
        self.db
            .append_message(conversation.id, Sender::User, query)
            .await?;
        self.db
            .append_message(conversation.id, Sender::Assistant, &response)
            .await?;

        Ok(ChatResponse {
            conversation_id: conversation.id,
            response,
            subject: subject_name,
            sources,
            response_time: (started.elapsed().as_secs_f64() * 100.0).round() / 100.0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Subject, SubjectSource};
    use crate::crawler::{CrawlerConfig, DomainLocks, PageFetcher, PageIndexer};
    use crate::index::IndexConfig;
    use crate::model::Client;
    use crate::model::mock_model::{MockCompletionModel, MockEmbeddingModel};
    use crate::search::RetrieverConfig;
    use crate::test_support::temp_database;
    use tempfile::{TempDir, tempdir};

    struct Fixture {
        service: ChatService<MockCompletionModel, MockEmbeddingModel>,
        completion: MockCompletionModel,
        db: Database,
        _dirs: (TempDir, TempDir),
    }

    async fn fixture() -> Fixture {
        let docs = tempdir().unwrap();
        std::fs::write(
            docs.path().join("mill.txt"),
            "Contents\x0cOil the spindle daily\x0cReplace the water tank monthly",
        )
        .unwrap();
        let (db, db_dir) = temp_database().await;

        let completion = MockCompletionModel::new();
        let embedding = MockEmbeddingModel::new();
        let fetcher = PageFetcher::new(db.clone(), CrawlerConfig::default()).unwrap();
        let indexes = IndexBuilder::new(
            embedding.clone(),
            PageIndexer::new(fetcher, DomainLocks::new()),
            db.clone(),
        )
        .with_config(IndexConfig {
            root: docs.path().join("rag-index"),
            documents_dir: docs.path().to_path_buf(),
            max_missing_text_fraction: 0.0,
        });
        let retriever = Retriever::new(
            Client::new(completion.clone(), embedding),
            RetrieverConfig::builder()
                .similarity_cutoff(None)
                .narrow_top_k(1)
                .build(),
        );
        let catalog = Catalog::new(vec![Subject {
            name: "Primemill".to_string(),
            description: "A milling unit".to_string(),
            source: SubjectSource::Document {
                filename: "mill.txt".to_string(),
                start_skip: 1,
                end_skip: 0,
            },
        }])
        .unwrap();

        Fixture {
            service: ChatService::new(db.clone(), catalog, indexes, retriever),
            completion,
            db,
            _dirs: (docs, db_dir),
        }
    }

    #[tokio::test]
    async fn test_known_subject() {
        let f = fixture().await;
        f.completion.push_text_response("Primemill").await;
        f.completion.push_text_response("Oil it daily.").await;

        let response = f.service.ask(None, "How often do I oil the spindle?").await.unwrap();
        assert_eq!(
            response.response,
            "You seem to be asking about Primemill.\n\nOil it daily."
        );
        assert_eq!(response.subject.as_deref(), Some("Primemill"));
        assert_eq!(response.sources.as_deref(), Some("2"));

        let messages = f.db.list_messages(response.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].content, response.response);
        let record = f.db.get_conversation(response.conversation_id).await.unwrap().unwrap();
        assert_eq!(record.subject.as_deref(), Some("Primemill"));
    }

    #[tokio::test]
    async fn test_unknown_subject_is_informational() {
        let f = fixture().await;
        f.completion.push_text_response("unknown").await;

        let response = f.service.ask(None, "Is it raining?").await.unwrap();
        assert!(response.response.contains("Primemill"));
        assert_eq!(response.subject, None);
        assert_eq!(response.sources, None);
        assert_eq!(f.completion.completion_calls(), 1);
        assert_eq!(
            f.db.list_messages(response.conversation_id).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_follow_up_keeps_subject_and_history() {
        let f = fixture().await;
        f.completion.push_text_response("Primemill").await;
        f.completion.push_text_response("Monthly.").await;
        let first = f.service.ask(None, "When do I replace the water tank?").await.unwrap();

        f.completion.push_text_response("unknown").await;
        f.completion.push_text_response("Yes, monthly.").await;
        let second = f
            .service
            .ask(Some(first.conversation_id), "Really?")
            .await
            .unwrap();

        assert_eq!(second.conversation_id, first.conversation_id);
        assert_eq!(second.subject.as_deref(), Some("Primemill"));
        let preambles = f.completion.preambles().await;
        assert!(preambles[3].contains("user:\nWhen do I replace the water tank?"));
        assert!(preambles[3].contains("assistant:\nYou seem to be asking about Primemill."));
    }

    #[tokio::test]
    async fn test_unknown_conversation_id() {
        let f = fixture().await;
        assert!(f.service.ask(Some(999), "hello").await.is_err());
    }
}
