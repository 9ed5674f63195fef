//! Stream consumption with rate-limited partial persistence.
//!
//! The consumer reads the response body, decodes deltas, and writes the
//! accumulated text to the outgoing message at most once per flush interval.
//! Every exit path ends with a final flush of the full text (skipped only when
//! the last write already carried it), so the stored body always equals what
//! was received.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, LlmError};
use crate::llm::provider::ByteStream;
use crate::llm::sse::{SseDecoder, SseEvent};
use crate::store::traits::ChatStore;

/// Lifecycle of a streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    AwaitingResponse,
    Streaming,
    Flushing,
    Done,
    Error,
}

/// The outgoing message a request writes to. Owned by that request alone.
#[derive(Debug)]
pub struct StreamedMessage {
    id: Uuid,
    body: String,
    last_flush: Instant,
    flushes: usize,
}

impl StreamedMessage {
    pub fn new(id: Uuid, body: impl Into<String>) -> Self {
        Self {
            id,
            body: body.into(),
            last_flush: Instant::now(),
            flushes: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Last body written to the store.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Number of writes issued by flushes.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Start the flush clock now.
    pub fn restart_clock(&mut self) {
        self.last_flush = Instant::now();
    }

    fn is_due(&self, interval: Duration) -> bool {
        self.last_flush.elapsed() > interval
    }

    /// Write `text` and reset the flush clock.
    pub async fn flush(&mut self, store: &dyn ChatStore, text: &str) -> Result<(), DatabaseError> {
        store.update_message(self.id, text).await?;
        self.body.clear();
        self.body.push_str(text);
        self.last_flush = Instant::now();
        self.flushes += 1;
        Ok(())
    }
}

/// How a consumed stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub text: String,
    pub cancelled: bool,
}

/// Reads a completion stream into text, flushing partial output.
pub struct StreamConsumer {
    store: Arc<dyn ChatStore>,
    flush_interval: Duration,
    state: StreamState,
}

impl StreamConsumer {
    pub fn new(store: Arc<dyn ChatStore>, flush_interval: Duration) -> Self {
        Self {
            store,
            flush_interval,
            state: StreamState::AwaitingResponse,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Consume `stream` until the `[DONE]` sentinel, end of body, or cancellation.
    ///
    /// With no `message` (guest sessions) nothing is persisted. A transport
    /// error mid-stream still flushes what was received before it is returned.
    pub async fn consume(
        &mut self,
        mut stream: ByteStream,
        mut message: Option<&mut StreamedMessage>,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, crate::error::Error> {
        self.state = StreamState::Streaming;
        if let Some(msg) = message.as_deref_mut() {
            msg.restart_clock();
        }

        let mut decoder = SseDecoder::new();
        let mut text = String::new();
        let mut cancelled = false;
        let mut failure: Option<LlmError> = None;

        'read: loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break 'read;
                }
                next = stream.next() => next,
            };

            let (events, end_of_body) = match next {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => {
                    failure = Some(e);
                    break 'read;
                }
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for event in events {
                match event {
                    SseEvent::Done => break 'read,
                    SseEvent::Delta(delta) => {
                        text.push_str(&delta);
                        if let Some(msg) = message.as_deref_mut()
                            && msg.is_due(self.flush_interval)
                            && let Err(e) = msg.flush(self.store.as_ref(), &text).await
                        {
                            warn!(message_id = %msg.id(), error = %e, "Partial flush failed");
                        }
                    }
                }
            }

            if end_of_body {
                break 'read;
            }
        }

        self.state = StreamState::Flushing;
        let flushed = match message {
            Some(msg) => {
                let result = if msg.body() == text {
                    Ok(())
                } else {
                    msg.flush(self.store.as_ref(), &text).await
                };
                debug!(
                    message_id = %msg.id(),
                    flushes = msg.flushes(),
                    len = text.len(),
                    "Final flush"
                );
                result
            }
            None => Ok(()),
        };

        if let Some(e) = failure {
            if let Err(flush_err) = flushed {
                warn!(error = %flush_err, "Final flush after stream error failed");
            }
            self.state = StreamState::Error;
            return Err(e.into());
        }
        if let Err(e) = flushed {
            self.state = StreamState::Error;
            return Err(e.into());
        }

        self.state = StreamState::Done;
        Ok(StreamOutcome { text, cancelled })
    }
}
