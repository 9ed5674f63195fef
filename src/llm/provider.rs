//! Provider-agnostic completion types and the `LlmProvider` trait.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a prompt turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single turn of the prompt sent upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Ask the provider to constrain output to a JSON object.
    pub json_output: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            json_output: false,
        }
    }

    pub fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Raw response body of a streaming call, chunked as it arrives.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// A chat-completion backend.
///
/// The credential is passed per call so a single provider can serve every
/// key in the pool.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Non-streaming completion; returns the full message content.
    async fn complete(
        &self,
        key: &SecretString,
        request: CompletionRequest,
    ) -> Result<String, LlmError>;

    /// Streaming completion. Resolves only once the provider answered with a
    /// success status; a non-success answer is `LlmError::Upstream`.
    async fn stream(
        &self,
        key: &SecretString,
        request: CompletionRequest,
    ) -> Result<ByteStream, LlmError>;
}
