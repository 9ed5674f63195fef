//! libSQL backend: async `ChatStore` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{Author, ChatStore, Conversation, NewMessage, StoredMessage};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    // Never read; owns the database `conn` was opened from.
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and guest-only deployments).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Read a nullable text column.
fn get_opt_text(row: &libsql::Row, idx: i32) -> Option<String> {
    match row.get_value(idx) {
        Ok(libsql::Value::Text(s)) => Some(s),
        _ => None,
    }
}

/// Drain `rows`, failing on the first unreadable row.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    op: &str,
    map: fn(&libsql::Row) -> T,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
    {
        out.push(map(&row));
    }
    Ok(out)
}

fn row_to_conversation(row: &libsql::Row) -> Conversation {
    let id_str: String = row.get(0).unwrap_or_default();
    let created_str: String = row.get(3).unwrap_or_default();
    Conversation {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: row.get(1).unwrap_or_default(),
        title: row.get(2).unwrap_or_default(),
        created_at: parse_datetime(&created_str),
    }
}

fn row_to_message(row: &libsql::Row) -> StoredMessage {
    let id_str: String = row.get(0).unwrap_or_default();
    let conversation_str: String = row.get(1).unwrap_or_default();
    let author_str: String = row.get(3).unwrap_or_default();
    let created_str: String = row.get(6).unwrap_or_default();
    StoredMessage {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        conversation_id: Uuid::parse_str(&conversation_str).unwrap_or_else(|_| Uuid::nil()),
        user_id: get_opt_text(row, 2),
        author: Author::parse(&author_str),
        body: row.get(4).unwrap_or_default(),
        model: get_opt_text(row, 5),
        created_at: parse_datetime(&created_str),
    }
}

// ── Trait implementation ────────────────────────────────────────────

const CONVERSATION_COLUMNS: &str = "id, user_id, title, created_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, user_id, author, body, model, created_at";

#[async_trait]
impl ChatStore for LibSqlBackend {
    // ── Conversations ───────────────────────────────────────────────

    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, DatabaseError> {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.conn()
            .execute(
                "INSERT INTO conversations (id, user_id, title, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation.id.to_string(),
                    user_id,
                    title,
                    conversation.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_conversation: {e}")))?;

        debug!(id = %conversation.id, user_id = user_id, "Conversation created");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_conversation: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_conversation(&row))),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_conversation: {e}"))),
        }
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_conversations: {e}")))?;

        collect_rows(rows, "list_conversations", row_to_conversation).await
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let failed = |e: libsql::Error| DatabaseError::Query(format!("delete_conversation: {e}"));
        let id = id.to_string();

        let tx = self.conn().transaction().await.map_err(failed)?;
        let deleted = async {
            tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![id.as_str()],
            )
            .await?;
            tx.execute("DELETE FROM conversations WHERE id = ?1", params![id.as_str()])
                .await
        }
        .await;

        match deleted {
            Ok(affected) => {
                tx.commit().await.map_err(failed)?;
                Ok(affected > 0)
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(failed(e))
            }
        }
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<(), DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE conversations SET title = ?1 WHERE id = ?2",
                params![title, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_title: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "conversation".to_string(),
                id: id.to_string(),
            });
        }
        debug!(id = %id, title = title, "Conversation title updated");
        Ok(())
    }

    // ── Messages ────────────────────────────────────────────────────

    async fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 ORDER BY seq ASC"
                ),
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_messages: {e}")))?;

        collect_rows(rows, "list_messages", row_to_message).await
    }

    async fn create_message(&self, message: NewMessage<'_>) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO messages (id, conversation_id, user_id, author, body, model,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    message.conversation_id.to_string(),
                    opt_text(message.user_id),
                    message.author.as_str(),
                    message.body,
                    opt_text(message.model),
                    now,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("create_message: {e}")))?;

        debug!(
            id = %id,
            conversation_id = %message.conversation_id,
            author = message.author.as_str(),
            "Message inserted into DB"
        );
        Ok(id)
    }

    async fn update_message(&self, id: Uuid, body: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let affected = self
            .conn()
            .execute(
                "UPDATE messages SET body = ?1, updated_at = ?2 WHERE id = ?3",
                params![body, now, id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("update_message: {e}")))?;

        if affected == 0 {
            return Err(DatabaseError::NotFound {
                entity: "message".to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn clear_messages(&self, conversation_id: Uuid) -> Result<usize, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM messages WHERE conversation_id = ?1",
                params![conversation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("clear_messages: {e}")))?;
        Ok(affected as usize)
    }
}
