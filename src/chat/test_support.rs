//! In-memory collaborators for pipeline unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use secrecy::SecretString;
use uuid::Uuid;

use crate::chat::title::TitleDispatcher;
use crate::error::{DatabaseError, LlmError, SearchError};
use crate::llm::provider::{ByteStream, CompletionRequest, LlmProvider};
use crate::store::traits::{Author, ChatStore, Conversation, NewMessage, StoredMessage};
use crate::tools::planner::SearchPlan;
use crate::tools::search::{SearchProvider, SearchResponse};

/// One SSE line carrying `text` as a delta.
pub fn delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}

pub const DONE: &str = "data: [DONE]\n\n";

/// A byte stream yielding each item after its delay.
pub fn timed_stream(chunks: Vec<(Duration, Result<String, LlmError>)>) -> ByteStream {
    Box::pin(futures::stream::iter(chunks).then(|(delay, item)| async move {
        tokio::time::sleep(delay).await;
        item.map(Bytes::from)
    }))
}

/// A byte stream yielding every chunk immediately.
pub fn instant_stream(chunks: &[&str]) -> ByteStream {
    timed_stream(
        chunks
            .iter()
            .map(|c| (Duration::ZERO, Ok(c.to_string())))
            .collect(),
    )
}

// ── Store ───────────────────────────────────────────────────────────

#[derive(Default)]
struct StoreState {
    conversations: Vec<Conversation>,
    messages: Vec<StoredMessage>,
    creates: Vec<String>,
    updates: Vec<(Uuid, String)>,
    history_reads: usize,
}

/// Keeps everything in memory and records each message update.
#[derive(Default)]
pub struct RecordingStore {
    state: Mutex<StoreState>,
    fail_updates: bool,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_updates() -> Self {
        Self {
            fail_updates: true,
            ..Self::default()
        }
    }

    pub fn seed_conversation(&self, title: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().conversations.push(Conversation {
            id,
            user_id: "user-1".to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        });
        id
    }

    pub fn seed_message(&self, conversation_id: Uuid, author: Author, body: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().messages.push(StoredMessage {
            id,
            conversation_id,
            user_id: Some("user-1".to_string()),
            author,
            body: body.to_string(),
            model: None,
            created_at: Utc::now(),
        });
        id
    }

    pub fn title(&self, conversation_id: Uuid) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .map(|c| c.title.clone())
    }

    /// Bodies passed to `update_message`, in order.
    pub fn updates(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .updates
            .iter()
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Bodies passed to `create_message`, in order.
    pub fn created(&self) -> Vec<String> {
        self.state.lock().unwrap().creates.clone()
    }

    pub fn messages(&self) -> Vec<StoredMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    pub fn history_reads(&self) -> usize {
        self.state.lock().unwrap().history_reads
    }
}

#[async_trait]
impl ChatStore for RecordingStore {
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
        self.state
            .lock()
            .unwrap()
            .conversations
            .push(conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, DatabaseError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .conversations
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn delete_conversation(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state.messages.retain(|m| m.conversation_id != id);
        let before = state.conversations.len();
        state.conversations.retain(|c| c.id != id);
        Ok(state.conversations.len() < before)
    }

    async fn update_title(&self, id: Uuid, title: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        match state.conversations.iter_mut().find(|c| c.id == id) {
            Some(c) => {
                c.title = title.to_string();
                Ok(())
            }
            None => Err(DatabaseError::NotFound {
                entity: "conversation".to_string(),
                id: id.to_string(),
            }),
        }
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredMessage>, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        state.history_reads += 1;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn create_message(&self, message: NewMessage<'_>) -> Result<Uuid, DatabaseError> {
        let id = Uuid::new_v4();
        let mut state = self.state.lock().unwrap();
        state.creates.push(message.body.to_string());
        state.messages.push(StoredMessage {
            id,
            conversation_id: message.conversation_id,
            user_id: message.user_id.map(str::to_string),
            author: message.author,
            body: message.body.to_string(),
            model: message.model.map(str::to_string),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn update_message(&self, id: Uuid, body: &str) -> Result<(), DatabaseError> {
        if self.fail_updates {
            return Err(DatabaseError::Query("disk full".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.updates.push((id, body.to_string()));
        if let Some(m) = state.messages.iter_mut().find(|m| m.id == id) {
            m.body = body.to_string();
        }
        Ok(())
    }

    async fn clear_messages(&self, conversation_id: Uuid) -> Result<usize, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let before = state.messages.len();
        state.messages.retain(|m| m.conversation_id != conversation_id);
        Ok(before - state.messages.len())
    }
}

// ── LLM ─────────────────────────────────────────────────────────────

enum StreamScript {
    Chunks(Vec<String>),
    Status(u16, String),
}

/// Completion provider answering from canned responses keyed by model.
#[derive(Default)]
pub struct ScriptedLlm {
    completions: HashMap<String, Result<String, (u16, String)>>,
    stream: Mutex<Option<StreamScript>>,
    completion_log: Mutex<Vec<CompletionRequest>>,
    stream_log: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(mut self, model: &str, content: &str) -> Self {
        self.completions
            .insert(model.to_string(), Ok(content.to_string()));
        self
    }

    pub fn with_completion_error(mut self, model: &str, status: u16, body: &str) -> Self {
        self.completions
            .insert(model.to_string(), Err((status, body.to_string())));
        self
    }

    pub fn with_stream(self, chunks: &[&str]) -> Self {
        *self.stream.lock().unwrap() =
            Some(StreamScript::Chunks(chunks.iter().map(|c| c.to_string()).collect()));
        self
    }

    pub fn with_stream_status(self, status: u16, body: &str) -> Self {
        *self.stream.lock().unwrap() = Some(StreamScript::Status(status, body.to_string()));
        self
    }

    pub fn completions(&self) -> Vec<CompletionRequest> {
        self.completion_log.lock().unwrap().clone()
    }

    pub fn streams(&self) -> Vec<CompletionRequest> {
        self.stream_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        _key: &SecretString,
        request: CompletionRequest,
    ) -> Result<String, LlmError> {
        let response = self.completions.get(&request.model).cloned();
        self.completion_log.lock().unwrap().push(request);
        match response {
            Some(Ok(content)) => Ok(content),
            Some(Err((status, body))) => Err(LlmError::Upstream { status, body }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "no scripted completion".to_string(),
            }),
        }
    }

    async fn stream(
        &self,
        _key: &SecretString,
        request: CompletionRequest,
    ) -> Result<ByteStream, LlmError> {
        self.stream_log.lock().unwrap().push(request);
        match self.stream.lock().unwrap().take() {
            Some(StreamScript::Chunks(chunks)) => {
                let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
                Ok(instant_stream(&refs))
            }
            Some(StreamScript::Status(status, body)) => Err(LlmError::Upstream { status, body }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "no scripted stream".to_string(),
            }),
        }
    }
}

// ── Search ──────────────────────────────────────────────────────────

/// Search provider returning one canned response.
pub struct CannedSearch {
    response: Result<SearchResponse, SearchError>,
    plans: Mutex<Vec<SearchPlan>>,
}

impl CannedSearch {
    pub fn ok(response: SearchResponse) -> Self {
        Self {
            response: Ok(response),
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err(SearchError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            plans: Mutex::new(Vec::new()),
        }
    }

    pub fn plans(&self) -> Vec<SearchPlan> {
        self.plans.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchProvider for CannedSearch {
    async fn search(
        &self,
        _key: &SecretString,
        plan: &SearchPlan,
    ) -> Result<SearchResponse, SearchError> {
        self.plans.lock().unwrap().push(plan.clone());
        match &self.response {
            Ok(response) => Ok(response.clone()),
            Err(SearchError::Status { status, body }) => Err(SearchError::Status {
                status: *status,
                body: body.clone(),
            }),
            Err(e) => Err(SearchError::RequestFailed(e.to_string())),
        }
    }
}

// ── Titles ──────────────────────────────────────────────────────────

/// Records dispatches instead of running them.
#[derive(Default)]
pub struct RecordingDispatcher {
    calls: Mutex<Vec<(Uuid, String)>>,
}

impl RecordingDispatcher {
    pub fn calls(&self) -> Vec<(Uuid, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl TitleDispatcher for RecordingDispatcher {
    fn dispatch(&self, conversation_id: Uuid, message: String) {
        self.calls.lock().unwrap().push((conversation_id, message));
    }
}
