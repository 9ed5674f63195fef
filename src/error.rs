//! Error types for the chat relay.

/// Top-level error type for a chat request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

/// Configuration-related errors. Always raised before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required credential: {key}. {hint}")]
    MissingCredential { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Completion provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// The provider answered with a non-success status. `body` is the
    /// provider's own error text.
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Web search provider errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    RequestFailed(String),

    #[error("Search provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid search response: {0}")]
    InvalidResponse(String),
}

/// Search planning errors. Never leaves the planner; logged and replaced by
/// the fallback plan.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("Planner call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Planner output unusable: {0}")]
    Parse(String),
}

/// Title generation errors. Only ever logged by the background task.
#[derive(Debug, thiserror::Error)]
pub enum TitleError {
    #[error("Title call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Model returned an empty title")]
    Empty,

    #[error("Failed to save title: {0}")]
    Database(#[from] DatabaseError),

    #[error("No credential available: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
