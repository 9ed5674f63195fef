//! The chat pipeline.
//!
//! - `context`: base history and tool prompt injection
//! - `stream`: SSE consumption with rate-limited persistence
//! - `title`: background conversation naming
//! - `orchestrator`: runs a request through every stage

pub mod context;
pub mod orchestrator;
pub mod stream;
pub mod title;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{ContextBuilder, HistorySource, PromptContext, TranscriptTurn};
pub use orchestrator::{ChatOrchestrator, ChatRequest, ChatResponse};
pub use stream::{StreamConsumer, StreamOutcome, StreamState, StreamedMessage};
pub use title::{
    SpawningTitleDispatcher, TaskErrorSink, TitleDispatcher, TitleGenerator, TracingErrorSink,
};
