//! Chat request pipeline.
//!
//! Stages run strictly in order: credential selection, context build, tool
//! prompts, optional search planning and execution, the streamed completion,
//! and finally the last flush. Only title generation runs off to the side.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat::context::{ContextBuilder, HistorySource, TranscriptTurn};
use crate::chat::stream::{StreamConsumer, StreamedMessage};
use crate::chat::title::{SpawningTitleDispatcher, TitleDispatcher, TitleGenerator};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::llm::groq::GroqProvider;
use crate::llm::keys::KeyPool;
use crate::llm::provider::{CompletionRequest, LlmProvider};
use crate::store::traits::{Author, ChatStore, NewMessage};
use crate::tools::planner::SearchPlanner;
use crate::tools::search::{SearchExecutor, SearchProvider, TavilyClient, placeholder_body};
use crate::tools::{ToolKind, ToolSet};

/// One chat turn to answer.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub user_id: Option<String>,
    pub history: HistorySource,
    pub tools: ToolSet,
    /// Overrides the configured streaming model.
    pub model: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl ChatRequest {
    /// A turn in a stored conversation.
    pub fn durable(conversation_id: Uuid, message: impl Into<String>) -> Self {
        Self::with_history(HistorySource::Conversation(conversation_id), message)
    }

    /// A guest turn with a caller-supplied transcript.
    pub fn guest(transcript: Vec<TranscriptTurn>, message: impl Into<String>) -> Self {
        Self::with_history(HistorySource::Transcript(transcript), message)
    }

    fn with_history(history: HistorySource, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_id: None,
            history,
            tools: ToolSet::none(),
            model: None,
            cancel: None,
        }
    }

    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// What a finished chat turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResponse {
    pub text: String,
    /// The persisted answer, absent for guests.
    pub message_id: Option<Uuid>,
    pub cancelled: bool,
}

/// Drives one chat request through every stage.
pub struct ChatOrchestrator {
    keys: KeyPool,
    llm: Arc<dyn LlmProvider>,
    context: ContextBuilder,
    planner: SearchPlanner,
    search: SearchExecutor,
    store: Arc<dyn ChatStore>,
    titles: Arc<dyn TitleDispatcher>,
    default_model: String,
    flush_interval: Duration,
}

impl ChatOrchestrator {
    pub fn new(
        config: &ChatConfig,
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn SearchProvider>,
        store: Arc<dyn ChatStore>,
        titles: Arc<dyn TitleDispatcher>,
    ) -> Self {
        Self {
            keys: KeyPool::new(config.completion_keys.clone()),
            context: ContextBuilder::new(Arc::clone(&store), config.history_window),
            planner: SearchPlanner::new(Arc::clone(&llm), &config.planner_model),
            search: SearchExecutor::new(search, config.search_key.clone()),
            llm,
            store,
            titles,
            default_model: config.default_model.clone(),
            flush_interval: config.flush_interval,
        }
    }

    /// Wire up the Groq and Tavily clients and a spawning title dispatcher.
    pub fn from_config(config: &ChatConfig, store: Arc<dyn ChatStore>) -> Self {
        let llm: Arc<dyn LlmProvider> = Arc::new(GroqProvider::new(&config.completion_base_url));
        let search = Arc::new(TavilyClient::new(
            &config.search_base_url,
            config.search_max_results,
        ));
        let generator = Arc::new(TitleGenerator::new(
            Arc::clone(&llm),
            KeyPool::new(config.completion_keys.clone()),
            Arc::clone(&store),
            &config.title_model,
        ));
        let titles = Arc::new(SpawningTitleDispatcher::new(generator));
        Self::new(config, llm, search, store, titles)
    }

    /// Standalone search, outside any chat turn.
    pub fn search_executor(&self) -> &SearchExecutor {
        &self.search
    }

    /// Answer `request`, returning the full streamed text.
    pub async fn run(&self, request: ChatRequest) -> Result<ChatResponse> {
        // Credentials first: nothing touches the network without them.
        let key = self.keys.select()?;
        let search_key = if request.tools.contains(ToolKind::Search) {
            Some(self.search.credential()?.clone())
        } else {
            None
        };

        let conversation_id = match &request.history {
            HistorySource::Conversation(id) => Some(*id),
            HistorySource::Transcript(_) => None,
        };
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut ctx = self.context.build(&request.history).await?;
        let base_len = ctx.base_len();
        ctx.inject_tool_prompts(&request.tools);

        let mut message: Option<StreamedMessage> = None;
        if let Some(search_key) = &search_key {
            let plan = self
                .planner
                .plan(&key, &ctx.turns(), &request.message)
                .await
                .into_plan();

            if let Some(conversation_id) = conversation_id {
                let body = placeholder_body(&plan.query);
                let id = self
                    .store
                    .create_message(
                        NewMessage::new(conversation_id, Author::Ai, &body)
                            .with_user(request.user_id.as_deref())
                            .with_model(Some(model.as_str())),
                    )
                    .await?;
                message = Some(StreamedMessage::new(id, body));
            }

            if let Some(results) = self.search.search_context(search_key, &plan).await {
                ctx.prepend_system(results);
            }
        }

        let prompt = ctx.finish(&request.message);
        info!(
            model = %model,
            turns = prompt.len(),
            base_len,
            tools = ?request.tools,
            guest = conversation_id.is_none(),
            "Starting completion stream"
        );
        let stream = self
            .llm
            .stream(&key, CompletionRequest::new(&model, prompt))
            .await?;

        if let Some(conversation_id) = conversation_id {
            if message.is_none() {
                let id = self
                    .store
                    .create_message(
                        NewMessage::new(conversation_id, Author::Ai, "")
                            .with_user(request.user_id.as_deref())
                            .with_model(Some(model.as_str())),
                    )
                    .await?;
                message = Some(StreamedMessage::new(id, ""));
            }
            if base_len <= 1 {
                debug!(conversation_id = %conversation_id, "Dispatching title generation");
                self.titles.dispatch(conversation_id, request.message.clone());
            }
        }

        let cancel = request.cancel.clone().unwrap_or_default();
        let mut consumer = StreamConsumer::new(Arc::clone(&self.store), self.flush_interval);
        let outcome = consumer.consume(stream, message.as_mut(), &cancel).await?;

        info!(
            len = outcome.text.len(),
            cancelled = outcome.cancelled,
            "Chat turn complete"
        );
        Ok(ChatResponse {
            text: outcome.text,
            message_id: message.map(|m| m.id()),
            cancelled: outcome.cancelled,
        })
    }
}
