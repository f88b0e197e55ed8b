//! # On-disk vector index storage
//!
//! Each index lives in its own directory holding a libsql `nodes.db`.
//! Writes go to a sibling `<dir>.partial` directory that is renamed into
//! place once complete, so an interrupted build never looks finished.

use crate::index::{IndexError, Node, SourceRef, VectorIndex};
use crate::model::EmbeddingConversion;
use libsql::{Connection, Row, Value, params};
use rig::embeddings::Embedding;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

const NODES_FILE: &str = "nodes.db";

/// An index exists when its directory exists and is non-empty
pub fn index_exists(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

async fn open(path: &Path) -> Result<Connection, IndexError> {
    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| IndexError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;
    db.connect()
        .map_err(|e| IndexError::Storage(format!("Failed to connect to {}: {}", path.display(), e)))
}

fn partial_dir(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Write every node of the index into `dir`, replacing what was there
#[instrument(skip(index), fields(key = index.key(), nodes = index.len()))]
pub async fn persist(index: &VectorIndex, dir: &Path) -> Result<(), IndexError> {
    let staging = partial_dir(dir);
    if staging.exists() {
        tokio::fs::remove_dir_all(&staging).await?;
    }
    tokio::fs::create_dir_all(&staging).await?;

    {
        let conn = open(&staging.join(NODES_FILE)).await?;
        conn.execute(
            "CREATE TABLE nodes (
                id TEXT PRIMARY KEY,
                ref_id TEXT NOT NULL,
                text TEXT NOT NULL,
                position INTEGER NOT NULL,
                heading TEXT,
                embedding BLOB NOT NULL
            )",
            params![],
        )
        .await
        .map_err(|e| IndexError::Storage(format!("Failed to create nodes table: {}", e)))?;

        for node in index.nodes() {
            conn.execute(
                "INSERT INTO nodes (id, ref_id, text, position, heading, embedding)
                 VALUES (?, ?, ?, ?, ?, ?)",
                vec![
                    Value::Text(node.id.clone()),
                    Value::Text(node.source.to_string()),
                    Value::Text(node.text.clone()),
                    Value::Integer(node.position as i64),
                    node.heading.clone().map_or(Value::Null, Value::Text),
                    Value::Blob(node.embedding.to_binary()),
                ],
            )
            .await
            .map_err(|e| IndexError::Storage(format!("Failed to insert node {}: {}", node.id, e)))?;
        }
    }

    if dir.exists() {
        tokio::fs::remove_dir_all(dir).await?;
    }
    tokio::fs::rename(&staging, dir).await?;
    info!(dir = %dir.display(), "Persisted index");
    Ok(())
}

/// Load the index stored in `dir`
#[instrument]
pub async fn load(key: &str, dir: &Path) -> Result<VectorIndex, IndexError> {
    let path = dir.join(NODES_FILE);
    if !path.exists() {
        return Err(IndexError::Storage(format!(
            "{} has no {}",
            dir.display(),
            NODES_FILE
        )));
    }

    let conn = open(&path).await?;
    let mut rows = conn
        .query(
            "SELECT id, ref_id, text, position, heading, embedding FROM nodes ORDER BY rowid",
            params![],
        )
        .await
        .map_err(|e| IndexError::Storage(format!("Failed to read nodes: {}", e)))?;

    let mut nodes = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| IndexError::Storage(format!("Failed to read node row: {}", e)))?
    {
        nodes.push(row_to_node(&row)?);
    }

    debug!(nodes = nodes.len(), "Loaded index");
    Ok(VectorIndex::new(key, nodes))
}

fn row_to_node(row: &Row) -> Result<Node, IndexError> {
    let column = |e: libsql::Error| IndexError::Storage(format!("Malformed node row: {}", e));

    let id: String = row.get(0).map_err(column)?;
    let ref_id: String = row.get(1).map_err(column)?;
    let text: String = row.get(2).map_err(column)?;
    let position: i64 = row.get(3).map_err(column)?;
    let heading = match row.get_value(4).map_err(column)? {
        Value::Text(heading) => Some(heading),
        _ => None,
    };
    let blob: Vec<u8> = row.get(5).map_err(column)?;

    let mut embedding = Embedding::from_binary(&blob);
    embedding.document = text.clone();

    Ok(Node {
        id,
        source: SourceRef::parse(&ref_id),
        text,
        position: position as usize,
        heading,
        embedding,
    })
}
