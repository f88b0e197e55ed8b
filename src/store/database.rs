//! Database operations for the record store

use crate::store::error::DbError;
use crate::store::schema;
use crate::store::{
    Conversation, Domain, NewDomain, RankMap, Sender, SiteUrl, StoredMessage, join_sitemap,
    split_sitemap,
};
use libsql::{Connection, Row, Rows, Value, params};
use tracing::{debug, instrument};

const DOMAIN_COLUMNS: &str =
    "id, domain, sitemap, pagerank, textrank, time_to_index, ts_created, ts_updated";
const SITE_URL_COLUMNS: &str = "id, url, domain, html, text, ts_created, ts_updated";

/// Record store over a libsql connection
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create a new database manager
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self, DbError> {
        schema::initialize_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Create a new database manager from a path
    pub async fn new_from_path(path: &str) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::new(conn).await
    }

    /// Execute a custom query with parameters
    pub async fn execute_query<P>(&self, sql: &str, params: P) -> Result<Rows, DbError>
    where
        P: libsql::params::IntoParams,
    {
        self.conn
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to execute query: {}", e)))
    }

    /// Get a domain by host name
    pub async fn get_domain(&self, domain: &str) -> Result<Option<Domain>, DbError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {} FROM domains WHERE domain = ?", DOMAIN_COLUMNS),
                params![domain],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get domain: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_domain(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to read domain: {}", e))),
        }
    }

    /// Create a domain unless one already exists for the host.
    ///
    /// Returns the stored record, which is the pre-existing one when the host
    /// was already present.
    #[instrument(skip(self, new), fields(domain = %new.domain))]
    pub async fn create_domain_if_absent(&self, new: &NewDomain) -> Result<Domain, DbError> {
        let now = now();
        let changed = self
            .conn
            .execute(
                "INSERT INTO domains (domain, sitemap, pagerank, textrank, time_to_index, ts_created, ts_updated)
                 VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(domain) DO NOTHING",
                params![
                    new.domain.clone(),
                    join_sitemap(&new.sitemap),
                    new.pagerank.to_json()?,
                    new.textrank.to_json()?,
                    new.time_to_index,
                    now,
                    now,
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to create domain: {}", e)))?;
        debug!(created = changed > 0, "Domain create-if-absent");

        self.get_domain(&new.domain)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("domain {}", new.domain)))
    }

    /// Overwrite a domain's sitemap and rank maps, creating it if absent
    #[instrument(skip(self, new), fields(domain = %new.domain))]
    pub async fn refresh_domain(&self, new: &NewDomain) -> Result<Domain, DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE domains SET sitemap = ?, pagerank = ?, textrank = ?, time_to_index = ?, ts_updated = ?
                 WHERE domain = ?",
                params![
                    join_sitemap(&new.sitemap),
                    new.pagerank.to_json()?,
                    new.textrank.to_json()?,
                    new.time_to_index,
                    now(),
                    new.domain.clone(),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to refresh domain: {}", e)))?;

        if changed == 0 {
            return self.create_domain_if_absent(new).await;
        }

        self.get_domain(&new.domain)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("domain {}", new.domain)))
    }

    /// List all domains ordered by host name
    pub async fn list_domains(&self) -> Result<Vec<Domain>, DbError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {} FROM domains ORDER BY domain", DOMAIN_COLUMNS),
                params![],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list domains: {}", e)))?;

        let mut domains = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DbError::Data(format!("Failed to read domain: {}", e)))?
        {
            domains.push(row_to_domain(&row)?);
        }
        Ok(domains)
    }

    /// Get a page by its full URL
    pub async fn get_site_url(&self, url: &str) -> Result<Option<SiteUrl>, DbError> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {} FROM site_urls WHERE url = ?", SITE_URL_COLUMNS),
                params![url],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get site url: {}", e)))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_site_url(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::Data(format!("Failed to read site url: {}", e))),
        }
    }

    /// Create a page record unless the URL is already stored
    pub async fn create_site_url_if_absent(
        &self,
        url: &str,
        domain: &str,
        html: Option<&str>,
    ) -> Result<SiteUrl, DbError> {
        let now = now();
        self.conn
            .execute(
                "INSERT INTO site_urls (url, domain, html, text, ts_created, ts_updated)
                 VALUES (?, ?, ?, NULL, ?, ?)
                 ON CONFLICT(url) DO NOTHING",
                params![url, domain, opt_text(html), now, now],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to create site url: {}", e)))?;

        self.get_site_url(url)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("site url {}", url)))
    }

    /// List a domain's pages in creation order
    pub async fn list_site_urls_by_domain(&self, domain: &str) -> Result<Vec<SiteUrl>, DbError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {} FROM site_urls WHERE domain = ? ORDER BY id",
                    SITE_URL_COLUMNS
                ),
                params![domain],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list site urls: {}", e)))?;

        let mut pages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DbError::Data(format!("Failed to read site url: {}", e)))?
        {
            pages.push(row_to_site_url(&row)?);
        }
        Ok(pages)
    }

    /// Count a domain's pages and how many of them have no text yet
    pub async fn text_coverage(&self, domain: &str) -> Result<(u64, u64), DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*), COALESCE(SUM(CASE WHEN text IS NULL THEN 1 ELSE 0 END), 0)
                 FROM site_urls WHERE domain = ?",
                params![domain],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to count site urls: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DbError::Data(format!("Failed to read counts: {}", e)))?
            .ok_or_else(|| DbError::Data("No row returned from count".to_string()))?;
        let total: i64 = row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get total: {}", e)))?;
        let missing: i64 = row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get missing: {}", e)))?;
        Ok((total as u64, missing as u64))
    }

    /// Drop cached HTML for every page of a domain so the next fetch hits the
    /// network. Text is kept. Returns the number of pages cleared.
    pub async fn clear_site_url_html(&self, domain: &str) -> Result<u64, DbError> {
        self.conn
            .execute(
                "UPDATE site_urls SET html = NULL, ts_updated = ? WHERE domain = ? AND html IS NOT NULL",
                params![now(), domain],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to clear site url html: {}", e)))
    }

    pub async fn update_site_url_html(&self, url: &str, html: &str) -> Result<(), DbError> {
        self.update_site_url_field("html", url, html).await
    }

    pub async fn update_site_url_text(&self, url: &str, text: &str) -> Result<(), DbError> {
        self.update_site_url_field("text", url, text).await
    }

    async fn update_site_url_field(
        &self,
        column: &str,
        url: &str,
        value: &str,
    ) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                &format!(
                    "UPDATE site_urls SET {} = ?, ts_updated = ? WHERE url = ?",
                    column
                ),
                params![value, now(), url],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update site url {}: {}", column, e)))?;

        if changed == 0 {
            return Err(DbError::NotFound(format!("site url {}", url)));
        }
        Ok(())
    }

    /// Start a new conversation and return its id
    pub async fn create_conversation(&self, subject: Option<&str>) -> Result<i64, DbError> {
        self.conn
            .execute(
                "INSERT INTO conversations (subject, ts_created) VALUES (?, ?)",
                params![opt_text(subject), now()],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to create conversation: {}", e)))?;

        Ok(self.conn.last_insert_rowid())
    }

    pub async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, subject, ts_created FROM conversations WHERE id = ?",
                params![id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to get conversation: {}", e)))?;

        let row = match rows.next().await {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            Err(e) => return Err(DbError::Data(format!("Failed to read conversation: {}", e))),
        };

        Ok(Some(Conversation {
            id: row
                .get(0)
                .map_err(|e| DbError::Data(format!("Failed to get id: {}", e)))?,
            subject: get_opt_text(&row, 1, "subject")?,
            ts_created: row
                .get(2)
                .map_err(|e| DbError::Data(format!("Failed to get ts_created: {}", e)))?,
        }))
    }

    pub async fn set_conversation_subject(&self, id: i64, subject: &str) -> Result<(), DbError> {
        let changed = self
            .conn
            .execute(
                "UPDATE conversations SET subject = ? WHERE id = ?",
                params![subject, id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update conversation: {}", e)))?;

        if changed == 0 {
            return Err(DbError::NotFound(format!("conversation {}", id)));
        }
        Ok(())
    }

    /// Append a message to a conversation
    pub async fn append_message(
        &self,
        conversation_id: i64,
        sender: Sender,
        content: &str,
    ) -> Result<StoredMessage, DbError> {
        if self.get_conversation(conversation_id).await?.is_none() {
            return Err(DbError::NotFound(format!("conversation {}", conversation_id)));
        }

        let now = now();
        self.conn
            .execute(
                "INSERT INTO messages (conversation_id, sender, content, ts_created) VALUES (?, ?, ?, ?)",
                params![conversation_id, sender.as_str(), content, now],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to append message: {}", e)))?;

        Ok(StoredMessage {
            id: self.conn.last_insert_rowid(),
            conversation_id,
            sender,
            content: content.to_string(),
            ts_created: now,
        })
    }

    /// List a conversation's messages oldest first
    pub async fn list_messages(&self, conversation_id: i64) -> Result<Vec<StoredMessage>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, conversation_id, sender, content, ts_created
                 FROM messages WHERE conversation_id = ? ORDER BY id",
                params![conversation_id],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to list messages: {}", e)))?;

        let mut messages = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DbError::Data(format!("Failed to read message: {}", e)))?
        {
            let sender: String = row
                .get(2)
                .map_err(|e| DbError::Data(format!("Failed to get sender: {}", e)))?;
            messages.push(StoredMessage {
                id: row
                    .get(0)
                    .map_err(|e| DbError::Data(format!("Failed to get id: {}", e)))?,
                conversation_id: row
                    .get(1)
                    .map_err(|e| DbError::Data(format!("Failed to get conversation_id: {}", e)))?,
                sender: Sender::parse(&sender)
                    .ok_or_else(|| DbError::Data(format!("Unknown sender: {}", sender)))?,
                content: row
                    .get(3)
                    .map_err(|e| DbError::Data(format!("Failed to get content: {}", e)))?,
                ts_created: row
                    .get(4)
                    .map_err(|e| DbError::Data(format!("Failed to get ts_created: {}", e)))?,
            });
        }
        Ok(messages)
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn opt_text(value: Option<&str>) -> Value {
    match value {
        Some(v) => Value::Text(v.to_string()),
        None => Value::Null,
    }
}

fn get_opt_text(row: &Row, idx: i32, column: &str) -> Result<Option<String>, DbError> {
    match row
        .get_value(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", column, e)))?
    {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(DbError::Data(format!(
            "Unexpected value for {}: {:?}",
            column, other
        ))),
    }
}

/// Convert a database row to a Domain
fn row_to_domain(row: &Row) -> Result<Domain, DbError> {
    let sitemap: String = row
        .get(2)
        .map_err(|e| DbError::Data(format!("Failed to get sitemap: {}", e)))?;
    let pagerank: String = row
        .get(3)
        .map_err(|e| DbError::Data(format!("Failed to get pagerank: {}", e)))?;
    let textrank: String = row
        .get(4)
        .map_err(|e| DbError::Data(format!("Failed to get textrank: {}", e)))?;

    Ok(Domain {
        id: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get id: {}", e)))?,
        domain: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get domain: {}", e)))?,
        sitemap: split_sitemap(&sitemap),
        pagerank: RankMap::from_json(&pagerank)?,
        textrank: RankMap::from_json(&textrank)?,
        time_to_index: row
            .get(5)
            .map_err(|e| DbError::Data(format!("Failed to get time_to_index: {}", e)))?,
        ts_created: row
            .get(6)
            .map_err(|e| DbError::Data(format!("Failed to get ts_created: {}", e)))?,
        ts_updated: row
            .get(7)
            .map_err(|e| DbError::Data(format!("Failed to get ts_updated: {}", e)))?,
    })
}

/// Convert a database row to a SiteUrl
fn row_to_site_url(row: &Row) -> Result<SiteUrl, DbError> {
    Ok(SiteUrl {
        id: row
            .get(0)
            .map_err(|e| DbError::Data(format!("Failed to get id: {}", e)))?,
        url: row
            .get(1)
            .map_err(|e| DbError::Data(format!("Failed to get url: {}", e)))?,
        domain: row
            .get(2)
            .map_err(|e| DbError::Data(format!("Failed to get domain: {}", e)))?,
        html: get_opt_text(row, 3, "html")?,
        text: get_opt_text(row, 4, "text")?,
        ts_created: row
            .get(5)
            .map_err(|e| DbError::Data(format!("Failed to get ts_created: {}", e)))?,
        ts_updated: row
            .get(6)
            .map_err(|e| DbError::Data(format!("Failed to get ts_updated: {}", e)))?,
    })
}
