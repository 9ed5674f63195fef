//! LLM integration for the chat relay.
//!
//! - `provider`: wire-agnostic request types and the `LlmProvider` trait
//! - `groq`: reqwest client for the OpenAI-compatible Groq API
//! - `sse`: incremental decoding of streamed responses
//! - `keys`: per-request credential selection

pub mod groq;
pub mod keys;
pub mod provider;
pub mod sse;

pub use groq::GroqProvider;
pub use keys::KeyPool;
pub use provider::{ByteStream, ChatMessage, CompletionRequest, LlmProvider, Role};
pub use sse::{SseDecoder, SseEvent};
