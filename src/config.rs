//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

/// Environment variables holding completion-provider credentials.
pub const COMPLETION_KEY_VARS: &[&str] = &["GROQ_API_KEY", "GROQ_API_KEY_2", "GROQ_API_KEY_3"];

/// Environment variable holding the search-provider credential.
pub const SEARCH_KEY_VAR: &str = "TAVILY_API_KEY";

/// Chat pipeline configuration.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Completion-provider credentials. May be empty; the key pool reports
    /// that per request.
    pub completion_keys: Vec<SecretString>,
    /// Search-provider credential, only needed when search is requested.
    pub search_key: Option<SecretString>,
    /// Base URL of the OpenAI-compatible completion API.
    pub completion_base_url: String,
    /// Base URL of the search API.
    pub search_base_url: String,
    /// Model used for the streamed answer unless the request overrides it.
    pub default_model: String,
    /// Model used by the search planner.
    pub planner_model: String,
    /// Model used for conversation titles.
    pub title_model: String,
    /// Number of most recent history turns kept in the prompt.
    pub history_window: usize,
    /// Minimum time between two intermediate flushes.
    pub flush_interval: Duration,
    /// Maximum number of search results requested.
    pub search_max_results: u32,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            completion_keys: Vec::new(),
            search_key: None,
            completion_base_url: "https://api.groq.com/openai/v1".to_string(),
            search_base_url: "https://api.tavily.com".to_string(),
            default_model: "groq/compound".to_string(),
            planner_model: "groq/compound".to_string(),
            title_model: "llama-3.1-8b-instant".to_string(),
            history_window: 20,
            flush_interval: Duration::from_millis(100),
            search_max_results: 5,
        }
    }
}

impl ChatConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let completion_keys = COMPLETION_KEY_VARS
            .iter()
            .filter_map(|var| non_empty_var(var))
            .map(SecretString::from)
            .collect();

        let search_key = non_empty_var(SEARCH_KEY_VAR).map(SecretString::from);

        let history_window: usize = std::env::var("CHAT_RELAY_HISTORY_WINDOW")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.history_window);

        let flush_interval_ms: u64 = std::env::var("CHAT_RELAY_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.flush_interval.as_millis() as u64);

        let search_max_results: u32 = std::env::var("CHAT_RELAY_SEARCH_MAX_RESULTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.search_max_results);

        Self {
            completion_keys,
            search_key,
            completion_base_url: non_empty_var("CHAT_RELAY_GROQ_URL")
                .unwrap_or(defaults.completion_base_url),
            search_base_url: non_empty_var("CHAT_RELAY_TAVILY_URL")
                .unwrap_or(defaults.search_base_url),
            default_model: non_empty_var("CHAT_RELAY_MODEL").unwrap_or(defaults.default_model),
            planner_model: defaults.planner_model,
            title_model: defaults.title_model,
            history_window,
            flush_interval: Duration::from_millis(flush_interval_ms),
            search_max_results,
        }
    }
}

/// Server configuration for the HTTP binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let port: u16 = std::env::var("CHAT_RELAY_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080);
        let db_path = std::env::var("CHAT_RELAY_DB_PATH")
            .unwrap_or_else(|_| "./data/chat-relay.db".to_string());
        Self { port, db_path }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
