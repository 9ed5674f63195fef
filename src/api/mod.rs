//! HTTP surface for the chat relay.

mod handlers;

use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::chat::ChatOrchestrator;
use crate::error::{DatabaseError, Error};
use crate::store::ChatStore;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub store: Arc<dyn ChatStore>,
}

/// Build the Axum router with chat, search and conversation routes.
pub fn routes(orchestrator: Arc<ChatOrchestrator>, store: Arc<dyn ChatStore>) -> Router {
    let state = AppState {
        orchestrator,
        store,
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/chat", post(handlers::chat))
        .route("/api/search", post(handlers::search))
        .route(
            "/api/conversations",
            get(handlers::list_conversations).post(handlers::create_conversation),
        )
        .route(
            "/api/conversations/{id}",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .route(
            "/api/conversations/{id}/messages",
            get(handlers::list_messages).post(handlers::create_message),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Error returned by handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    Relay(Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Relay(Error::Config(_)) => StatusCode::BAD_REQUEST,
            ApiError::Relay(Error::Llm(_)) | ApiError::Relay(Error::Search(_)) => {
                StatusCode::BAD_GATEWAY
            }
            ApiError::Relay(Error::Database(DatabaseError::NotFound { .. })) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Relay(Error::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(m) | ApiError::NotFound(m) | ApiError::Internal(m) => m.clone(),
            ApiError::Relay(e) => e.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Relay(e)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        ApiError::Relay(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self.message(), "Request failed");
        }
        (status, Json(serde_json::json!({"error": self.message()}))).into_response()
    }
}
