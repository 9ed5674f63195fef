use std::sync::Arc;

use anyhow::Context;

use chat_relay::api;
use chat_relay::chat::ChatOrchestrator;
use chat_relay::config::{ChatConfig, ServerConfig};
use chat_relay::store::{ChatStore, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ChatConfig::from_env();
    let server = ServerConfig::from_env();

    eprintln!("💬 Chat Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.default_model);
    eprintln!("   Completion keys: {}", config.completion_keys.len());
    eprintln!(
        "   Search: {}",
        if config.search_key.is_some() {
            "enabled"
        } else {
            "no key (search tool unavailable)"
        }
    );
    if config.completion_keys.is_empty() {
        eprintln!("   Warning: no GROQ_API_KEY set, every chat request will be rejected");
    }

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&server.db_path);
    let store: Arc<dyn ChatStore> = Arc::new(
        LibSqlBackend::new_local(db_path)
            .await
            .with_context(|| format!("failed to open database at {}", server.db_path))?,
    );
    eprintln!("   Database: {}", server.db_path);

    // ── Pipeline + HTTP ──────────────────────────────────────────────────
    let orchestrator = Arc::new(ChatOrchestrator::from_config(&config, Arc::clone(&store)));
    let app = api::routes(orchestrator, store);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server.port))
        .await
        .with_context(|| format!("failed to bind port {}", server.port))?;
    eprintln!("   HTTP: http://0.0.0.0:{}\n", server.port);
    tracing::info!(port = server.port, "Chat relay started");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
