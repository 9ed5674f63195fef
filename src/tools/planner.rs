//! Search planner: turns the raw user message into a search query and depth.
//!
//! Planning is best-effort: every failure resolves to the fallback plan
//! (original message, shallow search) and the pipeline carries on.

use std::sync::Arc;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PlanningError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Instruction appended after the pending user message.
const PLANNER_INSTRUCTION: &str = "You are a search optimizer. Based on the user's last message, \
    output a JSON object with two fields: 'query' (the best search query to find the answer) \
    and 'mode' (either 'search' or 'extract'). Output ONLY valid JSON.";

/// Search depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Shallow lookup.
    #[default]
    Search,
    /// Deeper crawl with raw page content.
    Extract,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Search => "search",
            SearchMode::Extract => "extract",
        }
    }
}

/// Refined query and depth for one search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPlan {
    pub query: String,
    pub mode: SearchMode,
}

impl SearchPlan {
    /// The plan used whenever planning fails.
    pub fn fallback(message: &str) -> Self {
        Self {
            query: message.to_string(),
            mode: SearchMode::Search,
        }
    }
}

/// Result of interpreting the planner's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanOutcome {
    Planned(SearchPlan),
    Fallback { plan: SearchPlan, reason: String },
}

impl PlanOutcome {
    pub fn plan(&self) -> &SearchPlan {
        match self {
            PlanOutcome::Planned(plan) | PlanOutcome::Fallback { plan, .. } => plan,
        }
    }

    pub fn into_plan(self) -> SearchPlan {
        match self {
            PlanOutcome::Planned(plan) | PlanOutcome::Fallback { plan, .. } => plan,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PlanOutcome::Fallback { .. })
    }
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

/// Interpret planner output, falling back to `original_message` when it is unusable.
///
/// A missing or unknown `mode` keeps the planned query with a shallow search;
/// a missing or blank `query` falls back entirely.
pub fn parse_plan(raw: &str, original_message: &str) -> PlanOutcome {
    let fallback = |reason: String| PlanOutcome::Fallback {
        plan: SearchPlan::fallback(original_message),
        reason,
    };

    let json_str = extract_json_object(raw);
    let parsed: RawPlan = match serde_json::from_str(&json_str) {
        Ok(p) => p,
        Err(e) => return fallback(format!("JSON parse error: {e}")),
    };

    let query = match parsed.query.map(|q| q.trim().to_string()) {
        Some(q) if !q.is_empty() => q,
        _ => return fallback("plan has no query".to_string()),
    };

    let mode = match parsed.mode.as_deref() {
        Some("extract") => SearchMode::Extract,
        _ => SearchMode::Search,
    };

    PlanOutcome::Planned(SearchPlan { query, mode })
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    // Already a JSON object
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    // Wrapped in markdown code block
    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // Try to find object bounds
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

/// Asks the completion provider for a search plan.
pub struct SearchPlanner {
    llm: Arc<dyn LlmProvider>,
    model: String,
}

impl SearchPlanner {
    pub fn new(llm: Arc<dyn LlmProvider>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Plan a search for `message` given the context assembled so far.
    /// Never fails; see `parse_plan` for the fallback rules.
    pub async fn plan(
        &self,
        key: &SecretString,
        context: &[ChatMessage],
        message: &str,
    ) -> PlanOutcome {
        let outcome = match self.request_plan(key, context, message).await {
            Ok(raw) => parse_plan(&raw, message),
            Err(e) => PlanOutcome::Fallback {
                plan: SearchPlan::fallback(message),
                reason: e.to_string(),
            },
        };

        match &outcome {
            PlanOutcome::Planned(plan) => {
                debug!(query = %plan.query, mode = plan.mode.as_str(), "Search planned");
            }
            PlanOutcome::Fallback { reason, .. } => {
                warn!(reason = %reason, "Search planning failed, using raw message");
            }
        }
        outcome
    }

    async fn request_plan(
        &self,
        key: &SecretString,
        context: &[ChatMessage],
        message: &str,
    ) -> Result<String, PlanningError> {
        let mut messages = context.to_vec();
        messages.push(ChatMessage::user(message));
        messages.push(ChatMessage::system(PLANNER_INSTRUCTION));

        let request = CompletionRequest::new(&self.model, messages).with_json_output();
        let raw = self.llm.complete(key, request).await?;
        if raw.trim().is_empty() {
            return Err(PlanningError::Parse("empty planner output".to_string()));
        }
        Ok(raw)
    }
}
