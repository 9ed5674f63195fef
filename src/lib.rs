//! Chat relay: streaming, tool-augmented chat completions.

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod store;
pub mod tools;
