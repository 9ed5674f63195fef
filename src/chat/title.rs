//! Conversation naming.
//!
//! Runs once, in the background, on the first turn of a durable
//! conversation. Nothing it does can fail the chat request.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::TitleError;
use crate::llm::keys::KeyPool;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::store::traits::ChatStore;

const TITLE_INSTRUCTION: &str = "You are a specialized title generator. Based on the user's prompt, \
    generate a VERY short, catchy title (max 4 words). Output ONLY the title, no quotes or punctuation.";

/// Trim whitespace and one pair of surrounding double quotes.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    trimmed.trim().to_string()
}

/// Generates and stores a conversation title from its first message.
pub struct TitleGenerator {
    llm: Arc<dyn LlmProvider>,
    keys: KeyPool,
    store: Arc<dyn ChatStore>,
    model: String,
}

impl TitleGenerator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        keys: KeyPool,
        store: Arc<dyn ChatStore>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            keys,
            store,
            model: model.into(),
        }
    }

    /// Ask for a title and save it. Returns the saved title.
    pub async fn generate(&self, conversation_id: Uuid, message: &str) -> Result<String, TitleError> {
        let key = self.keys.select()?;
        let request = CompletionRequest::new(
            &self.model,
            vec![
                ChatMessage::system(TITLE_INSTRUCTION),
                ChatMessage::user(message),
            ],
        );

        let raw = self.llm.complete(&key, request).await?;
        let title = clean_title(&raw);
        if title.is_empty() {
            return Err(TitleError::Empty);
        }

        self.store.update_title(conversation_id, &title).await?;
        info!(conversation_id = %conversation_id, title = %title, "Conversation titled");
        Ok(title)
    }
}

/// Receives failures from background work.
pub trait TaskErrorSink: Send + Sync {
    fn report(&self, task: &'static str, conversation_id: Uuid, error: &TitleError);
}

/// Logs background failures.
pub struct TracingErrorSink;

impl TaskErrorSink for TracingErrorSink {
    fn report(&self, task: &'static str, conversation_id: Uuid, error: &TitleError) {
        error!(task = task, conversation_id = %conversation_id, error = %error, "Background task failed");
    }
}

/// Starts title generation without waiting for it.
pub trait TitleDispatcher: Send + Sync {
    fn dispatch(&self, conversation_id: Uuid, message: String);
}

/// Dispatches each title job onto the tokio runtime.
pub struct SpawningTitleDispatcher {
    generator: Arc<TitleGenerator>,
    errors: Arc<dyn TaskErrorSink>,
}

impl SpawningTitleDispatcher {
    pub fn new(generator: Arc<TitleGenerator>) -> Self {
        Self {
            generator,
            errors: Arc::new(TracingErrorSink),
        }
    }

    pub fn with_error_sink(mut self, errors: Arc<dyn TaskErrorSink>) -> Self {
        self.errors = errors;
        self
    }
}

impl TitleDispatcher for SpawningTitleDispatcher {
    fn dispatch(&self, conversation_id: Uuid, message: String) {
        let generator = Arc::clone(&self.generator);
        let errors = Arc::clone(&self.errors);
        tokio::spawn(async move {
            if let Err(e) = generator.generate(conversation_id, &message).await {
                errors.report("title", conversation_id, &e);
            }
        });
    }
}
