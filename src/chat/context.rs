//! Prompt context assembly.
//!
//! Final shape sent upstream:
//! `[search results?, canvas prompt?, code prompt?, ...history, current user turn]`.
//! Injections prepend, so the last one injected ends up first.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::llm::provider::ChatMessage;
use crate::store::traits::{Author, ChatStore};
use crate::tools::{CANVAS_PROMPT, CODE_INTERPRETER_PROMPT, ToolKind, ToolSet};

/// A turn of a caller-supplied transcript.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptTurn {
    pub role: String,
    pub content: String,
}

impl TranscriptTurn {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Where the conversation history comes from.
#[derive(Debug, Clone)]
pub enum HistorySource {
    /// Durable conversation; history is read from the store.
    Conversation(Uuid),
    /// Guest session; the caller supplies the transcript.
    Transcript(Vec<TranscriptTurn>),
}

impl HistorySource {
    pub fn is_guest(&self) -> bool {
        matches!(self, HistorySource::Transcript(_))
    }
}

/// Ordered prompt turns for one request, before the current user turn.
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    turns: VecDeque<ChatMessage>,
    base_len: usize,
}

impl PromptContext {
    pub fn from_history(turns: Vec<ChatMessage>) -> Self {
        let base_len = turns.len();
        Self {
            turns: turns.into(),
            base_len,
        }
    }

    /// Number of history turns, excluding anything injected.
    pub fn base_len(&self) -> usize {
        self.base_len
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Put a system message in front of everything assembled so far.
    pub fn prepend_system(&mut self, content: impl Into<String>) {
        self.turns.push_front(ChatMessage::system(content));
    }

    /// Inject tool system prompts: code interpreter first, then canvas, so
    /// canvas ends up ahead of code.
    pub fn inject_tool_prompts(&mut self, tools: &ToolSet) {
        if tools.contains(ToolKind::CodeInterpreter) {
            self.prepend_system(CODE_INTERPRETER_PROMPT);
        }
        if tools.contains(ToolKind::Canvas) {
            self.prepend_system(CANVAS_PROMPT);
        }
    }

    /// Current turns, in prompt order.
    pub fn turns(&self) -> Vec<ChatMessage> {
        self.turns.iter().cloned().collect()
    }

    /// Append the current user turn and return the prompt.
    pub fn finish(self, user_message: &str) -> Vec<ChatMessage> {
        let mut turns: Vec<ChatMessage> = self.turns.into();
        turns.push(ChatMessage::user(user_message));
        turns
    }
}

/// Loads the base history for a request.
pub struct ContextBuilder {
    store: Arc<dyn ChatStore>,
    window: usize,
}

impl ContextBuilder {
    pub fn new(store: Arc<dyn ChatStore>, window: usize) -> Self {
        Self { store, window }
    }

    /// Build the base context. Durable history keeps only the newest
    /// `window` turns; a guest transcript is used as given.
    pub async fn build(&self, source: &HistorySource) -> Result<PromptContext, DatabaseError> {
        let turns = match source {
            HistorySource::Conversation(conversation_id) => {
                let history = self.store.list_messages(*conversation_id).await?;
                tracing::debug!(
                    conversation_id = %conversation_id,
                    history_len = history.len(),
                    "Loaded conversation history"
                );
                let skip = history.len().saturating_sub(self.window);
                history
                    .into_iter()
                    .skip(skip)
                    .map(|m| match m.author {
                        Author::User => ChatMessage::user(m.body),
                        Author::Ai => ChatMessage::assistant(m.body),
                    })
                    .collect()
            }
            HistorySource::Transcript(turns) => turns
                .iter()
                .map(|t| {
                    if t.role == "user" {
                        ChatMessage::user(t.content.clone())
                    } else {
                        ChatMessage::assistant(t.content.clone())
                    }
                })
                .collect(),
        };
        Ok(PromptContext::from_history(turns))
    }
}
