//! Web search via the Tavily API, and formatting of results into the prompt.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SEARCH_KEY_VAR;
use crate::error::{ConfigError, SearchError};
use crate::tools::planner::{SearchMode, SearchPlan};

/// A single search hit. Provider fields beyond the three we read are kept
/// so they reach the model unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Search response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// A web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(
        &self,
        key: &SecretString,
        plan: &SearchPlan,
    ) -> Result<SearchResponse, SearchError>;
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'static str,
    include_answer: bool,
    max_results: u32,
    topic: &'static str,
    include_images: bool,
    include_raw_content: bool,
}

/// HTTP client for Tavily's `/search` endpoint.
pub struct TavilyClient {
    client: reqwest::Client,
    base_url: String,
    max_results: u32,
}

impl TavilyClient {
    pub fn new(base_url: impl Into<String>, max_results: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_results,
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyClient {
    async fn search(
        &self,
        key: &SecretString,
        plan: &SearchPlan,
    ) -> Result<SearchResponse, SearchError> {
        let extract = plan.mode == SearchMode::Extract;
        let body = TavilyRequest {
            api_key: key.expose_secret(),
            query: &plan.query,
            search_depth: if extract { "advanced" } else { "basic" },
            include_answer: true,
            max_results: self.max_results,
            topic: "general",
            include_images: false,
            include_raw_content: extract,
        };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| SearchError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))
    }
}

/// Body shown to the user while a search runs.
pub fn placeholder_body(query: &str) -> String {
    format!("Searching with query: \"{query}\"...")
}

/// System message carrying the results and the citation rules.
pub fn results_message(plan: &SearchPlan, results: &[SearchResult]) -> Result<String, SearchError> {
    let json = serde_json::to_string(results)
        .map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
    Ok(format!(
        "Search Results for \"{query}\" (Mode: {mode}):\n{json}\n\n\
         INSTRUCTIONS: Use the provided search results to answer the user. \
         ALWAYS cite your sources inline or at the end using markdown links with the format [[Title](URL)]. \
         Ensure the URLs match the 'url' field in the provided JSON.",
        query = plan.query,
        mode = plan.mode.as_str(),
    ))
}

/// Runs searches with the configured search credential.
pub struct SearchExecutor {
    provider: Arc<dyn SearchProvider>,
    key: Option<SecretString>,
}

impl SearchExecutor {
    pub fn new(provider: Arc<dyn SearchProvider>, key: Option<SecretString>) -> Self {
        Self { provider, key }
    }

    /// The search credential, or the configuration error raised when a
    /// request asks for search without one.
    pub fn credential(&self) -> Result<&SecretString, ConfigError> {
        self.key.as_ref().ok_or_else(|| ConfigError::MissingCredential {
            key: SEARCH_KEY_VAR.to_string(),
            hint: "The search tool needs a search API key.".to_string(),
        })
    }

    /// Standalone search. Failures propagate.
    pub async fn search(&self, plan: &SearchPlan) -> crate::error::Result<SearchResponse> {
        let key = self.credential()?;
        Ok(self.provider.search(key, plan).await?)
    }

    /// In-chat search: returns the system message to inject, or `None` if the
    /// search failed (logged, never fatal).
    pub async fn search_context(&self, key: &SecretString, plan: &SearchPlan) -> Option<String> {
        let outcome = match self.provider.search(key, plan).await {
            Ok(response) => results_message(plan, &response.results)
                .map(|message| (message, response.results.len())),
            Err(e) => Err(e),
        };

        match outcome {
            Ok((message, count)) => {
                info!(query = %plan.query, mode = plan.mode.as_str(), results = count, "Search complete");
                Some(message)
            }
            Err(e) => {
                warn!(error = %e, query = %plan.query, "Search failed, continuing without results");
                None
            }
        }
    }
}
