//! Groq (OpenAI-compatible) chat-completions client.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::llm::provider::{ByteStream, ChatMessage, CompletionRequest, LlmProvider};

const PROVIDER: &str = "groq";

/// JSON body of a chat-completions call.
#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct GroqProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GroqProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        key: &SecretString,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            stream,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(
        &self,
        key: &SecretString,
        request: CompletionRequest,
    ) -> Result<String, LlmError> {
        let response = self.send(key, &request, false).await?;
        let parsed: WireResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::InvalidResponse {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LlmError::InvalidResponse {
                provider: PROVIDER.to_string(),
                reason: "response has no choices".to_string(),
            })
    }

    async fn stream(
        &self,
        key: &SecretString,
        request: CompletionRequest,
    ) -> Result<ByteStream, LlmError> {
        let response = self.send(key, &request, true).await?;
        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Stream(e.to_string())));
        Ok(Box::pin(stream))
    }
}
