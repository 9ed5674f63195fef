//! `ChatStore` trait: the storage collaborator the chat pipeline depends on.
//!
//! Covers conversations and their messages. The pipeline itself only needs
//! `list_messages`, `create_message`, `update_message` and `update_title`;
//! the rest backs the HTTP surface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Who wrote a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Ai,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Ai => "ai",
        }
    }

    /// Anything that is not `"user"` is treated as the assistant.
    pub fn parse(s: &str) -> Self {
        if s == "user" { Author::User } else { Author::Ai }
    }
}

/// A conversation record.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted chat message.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Option<String>,
    pub author: Author,
    pub body: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields for a message insert.
#[derive(Debug, Clone, Copy)]
pub struct NewMessage<'a> {
    pub conversation_id: Uuid,
    pub user_id: Option<&'a str>,
    pub author: Author,
    pub body: &'a str,
    pub model: Option<&'a str>,
}

impl<'a> NewMessage<'a> {
    pub fn new(conversation_id: Uuid, author: Author, body: &'a str) -> Self {
        Self {
            conversation_id,
            user_id: None,
            author,
            body,
            model: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<&'a str>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_model(mut self, model: Option<&'a str>) -> Self {
        self.model = model;
        self
    }
}

/// Backend-agnostic storage for conversations and messages.
#[async_trait]
pub trait ChatStore: Send + Sync {
    // ── Conversations ───────────────────────────────────────────────

    /// Create a conversation owned by `user_id`.
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> Result<Conversation, DatabaseError>;

    /// Get a conversation by ID.
    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError>;

    /// List a user's conversations, newest first.
    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, DatabaseError>;

    /// Delete a conversation and all of its messages. Returns false if it did not exist.
    async fn delete_conversation(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// Rename a conversation.
    async fn update_title(&self, id: Uuid, title: &str) -> Result<(), DatabaseError>;

    // ── Messages ────────────────────────────────────────────────────

    /// List a conversation's messages in arrival order.
    async fn list_messages(&self, conversation_id: Uuid)
    -> Result<Vec<StoredMessage>, DatabaseError>;

    /// Insert a message. Returns the new message ID.
    async fn create_message(&self, message: NewMessage<'_>) -> Result<Uuid, DatabaseError>;

    /// Replace a message body. Later calls always carry the longer body.
    async fn update_message(&self, id: Uuid, body: &str) -> Result<(), DatabaseError>;

    /// Delete every message in a conversation. Returns the number removed.
    async fn clear_messages(&self, conversation_id: Uuid) -> Result<usize, DatabaseError>;
}
