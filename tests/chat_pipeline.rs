//! Integration tests for the chat relay HTTP surface.
//!
//! Each test spins up an Axum server on a random port, backed by an in-memory
//! libSQL store, with wiremock standing in for Groq and Tavily.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_relay::api;
use chat_relay::chat::ChatOrchestrator;
use chat_relay::config::ChatConfig;
use chat_relay::store::{ChatStore, LibSqlBackend};

struct Relay {
    base: String,
    http: reqwest::Client,
    groq: MockServer,
    tavily: MockServer,
}

impl Relay {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.http.post(self.url(path)).json(&body).send().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        self.http
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Bodies of every streaming call Groq received.
    async fn stream_calls(&self) -> Vec<Value> {
        self.groq
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|r| serde_json::from_slice::<Value>(&r.body).ok())
            .filter(|b| b["stream"] == true)
            .collect()
    }
}

/// Start the relay with the given completion keys.
async fn start_relay(keys: &[&str]) -> Relay {
    let groq = MockServer::start().await;
    let tavily = MockServer::start().await;

    let config = ChatConfig {
        completion_keys: keys.iter().map(|k| SecretString::from(*k)).collect(),
        search_key: Some(SecretString::from("tvly-test")),
        completion_base_url: groq.uri(),
        search_base_url: tavily.uri(),
        ..ChatConfig::default()
    };
    let store: Arc<dyn ChatStore> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let orchestrator = Arc::new(ChatOrchestrator::from_config(&config, Arc::clone(&store)));
    let app = api::routes(orchestrator, store);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Relay {
        base: format!("http://127.0.0.1:{port}"),
        http: reqwest::Client::new(),
        groq,
        tavily,
    }
}

fn sse_body(deltas: &[&str]) -> String {
    let mut body = String::new();
    for d in deltas {
        body.push_str(&format!(
            "data: {}\n\n",
            json!({"choices": [{"delta": {"content": d}}]})
        ));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn mount_stream(groq: &MockServer, deltas: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(deltas), "text/event-stream"),
        )
        .mount(groq)
        .await;
}

async fn mount_completion(groq: &MockServer, matcher: Value, content: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(matcher))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })))
        .mount(groq)
        .await;
}

async fn create_conversation(relay: &Relay) -> String {
    let created: Value = relay
        .post("/api/conversations", json!({"user_id": "alice"}))
        .await
        .json()
        .await
        .unwrap();
    created["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let relay = start_relay(&["gsk-test"]).await;
    let body = relay.get_json("/health").await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn guest_chat_streams_full_text() {
    let relay = start_relay(&["gsk-test"]).await;
    mount_stream(&relay.groq, &["Hi ", "there!"]).await;

    let response = relay
        .post(
            "/api/chat",
            json!({
                "message": "Hello",
                "history": [
                    {"role": "user", "content": "earlier"},
                    {"role": "ai", "content": "reply"}
                ]
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["text"], "Hi there!");
    assert!(body["message_id"].is_null());

    let calls = relay.stream_calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0]["model"], "groq/compound");
    let messages = calls[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[2], json!({"role": "user", "content": "Hello"}));
}

#[tokio::test]
async fn durable_chat_persists_answer_and_titles_conversation() {
    let relay = start_relay(&["gsk-test"]).await;
    mount_stream(&relay.groq, &["Hi ", "there!"]).await;
    mount_completion(
        &relay.groq,
        json!({"model": "llama-3.1-8b-instant", "stream": false}),
        "\"Friendly Greeting\"",
    )
    .await;

    let conv = create_conversation(&relay).await;
    let user_msg = relay
        .post(
            &format!("/api/conversations/{conv}/messages"),
            json!({"author": "user", "body": "Hello", "user_id": "alice"}),
        )
        .await;
    assert_eq!(user_msg.status(), 201);

    let response = relay
        .post(
            "/api/chat",
            json!({"message": "Hello", "conversation_id": conv, "user_id": "alice"}),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["text"], "Hi there!");

    let messages = relay
        .get_json(&format!("/api/conversations/{conv}/messages"))
        .await;
    let messages = messages.as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["author"], "ai");
    assert_eq!(messages[1]["body"], "Hi there!");
    assert_eq!(messages[1]["model"], "groq/compound");
    assert_eq!(messages[1]["id"], body["message_id"]);

    // Title generation runs in the background.
    let mut title = Value::Null;
    for _ in 0..50 {
        title = relay.get_json(&format!("/api/conversations/{conv}")).await["title"].clone();
        if title == "Friendly Greeting" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(title, "Friendly Greeting");
}

#[tokio::test]
async fn search_tool_injects_results_first() {
    let relay = start_relay(&["gsk-test"]).await;
    mount_stream(&relay.groq, &["It is sunny."]).await;
    mount_completion(
        &relay.groq,
        json!({"response_format": {"type": "json_object"}}),
        r#"{"query": "NYC weather", "mode": "search"}"#,
    )
    .await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "api_key": "tvly-test",
            "query": "NYC weather",
            "search_depth": "basic",
            "max_results": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [
                {"title": "A", "url": "https://a.example", "content": "72F"},
                {"title": "B", "url": "https://b.example", "content": "clear"},
                {"title": "C", "url": "https://c.example", "content": "breezy"}
            ]
        })))
        .expect(1)
        .mount(&relay.tavily)
        .await;

    let response = relay
        .post(
            "/api/chat",
            json!({"message": "weather in new york?", "tools": ["search", "unknown_tool"]}),
        )
        .await;
    assert_eq!(response.status(), 200);

    let calls = relay.stream_calls().await;
    let messages = calls[0]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    let system = messages[0]["content"].as_str().unwrap();
    assert!(system.starts_with("Search Results for \"NYC weather\" (Mode: search):"));
    let results: Vec<Value> = serde_json::from_str(system.lines().nth(1).unwrap()).unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(messages[1]["content"], "weather in new york?");
}

#[tokio::test]
async fn missing_credentials_reject_before_any_call() {
    let relay = start_relay(&[]).await;
    mount_stream(&relay.groq, &["never"]).await;
    let conv = create_conversation(&relay).await;

    let response = relay
        .post("/api/chat", json!({"message": "Hello", "conversation_id": conv}))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("GROQ_API_KEY"));

    assert!(relay.groq.received_requests().await.unwrap_or_default().is_empty());
    let messages = relay
        .get_json(&format!("/api/conversations/{conv}/messages"))
        .await;
    assert_eq!(messages, json!([]));
}

#[tokio::test]
async fn upstream_error_surfaces_provider_body() {
    let relay = start_relay(&["gsk-test"]).await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limit exceeded"))
        .mount(&relay.groq)
        .await;
    let conv = create_conversation(&relay).await;
    relay
        .post(
            &format!("/api/conversations/{conv}/messages"),
            json!({"author": "user", "body": "Hello"}),
        )
        .await;

    let response = relay
        .post("/api/chat", json!({"message": "Hello", "conversation_id": conv}))
        .await;
    assert_eq!(response.status(), 502);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("rate limit exceeded"));

    // Only the user's own message remains.
    let messages = relay
        .get_json(&format!("/api/conversations/{conv}/messages"))
        .await;
    assert_eq!(messages.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn standalone_search_returns_provider_results() {
    let relay = start_relay(&["gsk-test"]).await;
    Mock::given(method("POST"))
        .and(path("/search"))
        .and(body_partial_json(json!({
            "search_depth": "advanced",
            "include_raw_content": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answer": "Rust 1.85 shipped the 2024 edition.",
            "results": [{"title": "Rust Blog", "url": "https://blog.rust-lang.org", "content": "..."}]
        })))
        .mount(&relay.tavily)
        .await;

    let response = relay
        .post("/api/search", json!({"query": "rust 2024 edition", "mode": "extract"}))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["results"][0]["url"], "https://blog.rust-lang.org");
    assert_eq!(body["answer"], "Rust 1.85 shipped the 2024 edition.");
}

#[tokio::test]
async fn standalone_search_failure_is_bad_gateway() {
    let relay = start_relay(&["gsk-test"]).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("tavily down"))
        .mount(&relay.tavily)
        .await;

    let response = relay.post("/api/search", json!({"query": "anything"})).await;
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn conversation_lifecycle() {
    let relay = start_relay(&["gsk-test"]).await;
    let first = create_conversation(&relay).await;
    let second = create_conversation(&relay).await;

    let listed = relay.get_json("/api/conversations?user_id=alice").await;
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.as_str()) && ids.contains(&second.as_str()));
    assert_eq!(listed[0]["title"], "New Chat");

    let deleted = relay
        .http
        .delete(relay.url(&format!("/api/conversations/{first}")))
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), 204);

    let missing = relay
        .http
        .get(relay.url(&format!("/api/conversations/{first}")))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);

    let orphan = relay
        .post(
            &format!("/api/conversations/{first}/messages"),
            json!({"author": "user", "body": "hello?"}),
        )
        .await;
    assert_eq!(orphan.status(), 404);
}
