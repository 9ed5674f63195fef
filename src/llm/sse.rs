//! Incremental decoder for OpenAI-style server-sent-event streams.
//!
//! Bytes are buffered until a full line is available so a multi-byte
//! character or a JSON payload split across network chunks still decodes.

use serde::Deserialize;

/// Prefix of every payload line.
const DATA_PREFIX: &str = "data: ";

/// Payload that ends the stream.
const DONE_SENTINEL: &str = "[DONE]";

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Incremental text.
    Delta(String),
    /// The `[DONE]` sentinel.
    Done,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Line-buffering SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a network chunk; returns the events from every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the body ended without a final newline.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
    }
}

/// Parse one line. Non-data lines, empty deltas and malformed payloads yield `None`.
pub fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();

    if payload == DONE_SENTINEL {
        return Some(SseEvent::Done);
    }

    match serde_json::from_str::<ChunkPayload>(payload) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|text| !text.is_empty())
            .map(SseEvent::Delta),
        Err(e) => {
            tracing::trace!(error = %e, line = line, "Skipping malformed stream line");
            None
        }
    }
}
