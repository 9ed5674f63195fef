use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::chat::{ChatRequest, TranscriptTurn};
use crate::store::{Author, NewMessage};
use crate::tools::{SearchMode, SearchPlan, ToolSet};

const DEFAULT_TITLE: &str = "New Chat";

// ── Health ──────────────────────────────────────────────────────────────

pub(super) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chat-relay"
    }))
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct ChatBody {
    message: String,
    /// Present for stored conversations; absent for guests.
    #[serde(default)]
    conversation_id: Option<Uuid>,
    #[serde(default)]
    user_id: Option<String>,
    /// Guest transcript. Ignored when `conversation_id` is set.
    #[serde(default)]
    history: Vec<TranscriptTurn>,
    /// Missing and `null` both mean no tools.
    #[serde(default)]
    tools: Option<ToolSet>,
    #[serde(default)]
    model: Option<String>,
}

pub(super) async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".to_string()));
    }

    let mut request = match body.conversation_id {
        Some(id) => ChatRequest::durable(id, body.message),
        None => ChatRequest::guest(body.history, body.message),
    }
    .with_tools(body.tools.unwrap_or_default());
    if let Some(user_id) = body.user_id {
        request = request.with_user(user_id);
    }
    if let Some(model) = body.model {
        request = request.with_model(model);
    }

    // The turn runs on its own task so a dropped connection cancels the
    // stream instead of abandoning it mid-flush.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let orchestrator = state.orchestrator.clone();
    let task = tokio::spawn(async move { orchestrator.run(request.with_cancel(cancel)).await });

    let response = task
        .await
        .map_err(|e| ApiError::Internal(format!("chat task failed: {e}")))??;

    Ok(Json(serde_json::json!({
        "text": response.text,
        "message_id": response.message_id,
        "cancelled": response.cancelled,
    })))
}

// ── Search ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct SearchBody {
    query: String,
    #[serde(default)]
    mode: SearchMode,
}

pub(super) async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let plan = SearchPlan {
        query: body.query,
        mode: body.mode,
    };
    let response = state.orchestrator.search_executor().search(&plan).await?;
    info!(query = %plan.query, results = response.results.len(), "Standalone search");
    Ok(Json(response))
}

// ── Conversations ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct CreateConversationBody {
    user_id: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ListConversationsQuery {
    user_id: String,
}

pub(super) async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let title = body.title.as_deref().unwrap_or(DEFAULT_TITLE);
    let conversation = state.store.create_conversation(&body.user_id, title).await?;
    debug!(conversation_id = %conversation.id, "Conversation created");
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub(super) async fn list_conversations(
    State(state): State<AppState>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let conversations = state.store.list_conversations(&query.user_id).await?;
    Ok(Json(conversations))
}

pub(super) async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.get_conversation(id).await? {
        Some(conversation) => Ok(Json(conversation)),
        None => Err(ApiError::NotFound("Conversation not found".to_string())),
    }
}

pub(super) async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.delete_conversation(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Conversation not found".to_string()))
    }
}

// ── Messages ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(super) struct CreateMessageBody {
    author: Author,
    body: String,
    #[serde(default)]
    user_id: Option<String>,
}

pub(super) async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.store.list_messages(id).await?))
}

pub(super) async fn create_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CreateMessageBody>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.get_conversation(id).await?.is_none() {
        return Err(ApiError::NotFound("Conversation not found".to_string()));
    }
    let message_id = state
        .store
        .create_message(
            NewMessage::new(id, body.author, &body.body).with_user(body.user_id.as_deref()),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": message_id})),
    ))
}
