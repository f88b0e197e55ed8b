//! # Record Store Schema
//!
//! Tables for crawled sites and conversation history:
//! 1. `domains` - one row per host, with its sitemap and rank maps
//! 2. `site_urls` - one row per page, with cached HTML and ranked text
//! 3. `conversations` / `messages` - per-conversation chat state

use crate::store::error::DbError;
use libsql::{Connection, params};

/// Initialize the database schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS domains (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL UNIQUE,
            sitemap TEXT NOT NULL,
            pagerank TEXT NOT NULL,
            textrank TEXT NOT NULL,
            time_to_index REAL NOT NULL DEFAULT 0,
            ts_created INTEGER NOT NULL,
            ts_updated INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create domains table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS site_urls (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL UNIQUE,
            domain TEXT NOT NULL,
            html TEXT,
            text TEXT,
            ts_created INTEGER NOT NULL,
            ts_updated INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create site_urls table: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_site_urls_domain ON site_urls(domain)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on site_urls: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS conversations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            subject TEXT,
            ts_created INTEGER NOT NULL
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create conversations table: {}", e)))?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER NOT NULL,
            sender TEXT NOT NULL,
            content TEXT NOT NULL,
            ts_created INTEGER NOT NULL,
            FOREIGN KEY (conversation_id) REFERENCES conversations(id) ON DELETE CASCADE
        )",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create messages table: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id)",
        params![],
    )
    .await
    .map_err(|e| DbError::Schema(format!("Failed to create index on messages: {}", e)))?;

    Ok(())
}
