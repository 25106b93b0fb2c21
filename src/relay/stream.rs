//! Streaming pipeline
//!
//! Turns a backend body (a stream of byte chunks) into a pull-based stream of
//! `NormalizedEvent`s. Nothing is read from the backend until the consumer
//! polls, so a slow caller stalls backend reads instead of filling a buffer.
//!
//! ```text
//! read chunk -> buffer -> split lines -> drop blanks -> adapter -> event
//! ```

use std::pin::Pin;
use std::time::Instant;

use futures_util::{Stream, StreamExt};

use super::client::{drain_lines, drain_remainder};
use super::context::NormalizedEvent;
use super::error::{RelayError, RelayResult};
use crate::adapters::Adapter;
use crate::logger;

/// Caller-facing event stream
pub type EventStream = Pin<Box<dyn Stream<Item = RelayResult<NormalizedEvent>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Open,
    Completed,
    Failed,
}

/// Tracks one stream and logs its close exactly once, on drop.
///
/// Dropping the guard coincides with dropping the backend body, so the log
/// line also marks the release of the backend connection.
struct StreamGuard {
    backend: &'static str,
    request_id: String,
    started: Instant,
    fragments: usize,
    chars: usize,
    outcome: Outcome,
}

impl StreamGuard {
    fn new(backend: &'static str, request_id: String) -> Self {
        Self {
            backend,
            request_id,
            started: Instant::now(),
            fragments: 0,
            chars: 0,
            outcome: Outcome::Open,
        }
    }

    fn record(&mut self, event: &NormalizedEvent) {
        match event {
            NormalizedEvent::Content(text) => {
                self.fragments += 1;
                self.chars += text.chars().count();
            }
            NormalizedEvent::Terminal => self.outcome = Outcome::Completed,
        }
    }

    fn fail(&mut self) {
        self.outcome = Outcome::Failed;
    }

    fn terminated(&self) -> bool {
        self.outcome != Outcome::Open
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let outcome = match self.outcome {
            Outcome::Open => "cancelled",
            Outcome::Completed => "completed",
            Outcome::Failed => "failed",
        };
        let message = format!(
            "Stream closed: request_id={}, backend={}, outcome={}, fragments={}, chars={}, elapsed={}ms",
            self.request_id,
            self.backend,
            outcome,
            self.fragments,
            self.chars,
            self.started.elapsed().as_millis()
        );
        match self.outcome {
            Outcome::Failed => logger::warn("stream", &message),
            _ => logger::info("stream", &message),
        }
    }
}

/// Normalize a backend body into an event stream.
///
/// Success paths end with exactly one `Terminal`; once the backend signals
/// termination nothing more is read. A read error yields one
/// `RelayError::Transport` and ends the stream with no terminal event.
pub fn normalize_stream<S, B, E>(adapter: Adapter, body: S, request_id: String) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let stream = async_stream::stream! {
        let mut guard = StreamGuard::new(adapter.name(), request_id);
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();

        while !guard.terminated() {
            let lines = match body.next().await {
                Some(Ok(chunk)) => drain_lines(&mut buffer, chunk.as_ref()),
                Some(Err(e)) => {
                    logger::error(
                        "stream",
                        &format!("Stream read error: request_id={}, error={}", guard.request_id, e),
                    );
                    guard.fail();
                    yield Err(RelayError::Transport(format!("Stream interrupted: {}", e)));
                    break;
                }
                None => {
                    let rest = drain_remainder(&mut buffer).into_iter().collect::<Vec<_>>();
                    for line in rest.iter().filter(|l| !l.trim().is_empty()) {
                        for event in adapter.parse_stream_line(line) {
                            if guard.terminated() {
                                break;
                            }
                            guard.record(&event);
                            yield Ok(event);
                        }
                    }
                    if !guard.terminated() {
                        logger::debug(
                            "stream",
                            &format!("Backend closed without terminal marker: request_id={}", guard.request_id),
                        );
                        guard.record(&NormalizedEvent::Terminal);
                        yield Ok(NormalizedEvent::Terminal);
                    }
                    break;
                }
            };

            for line in lines.iter().filter(|l| !l.trim().is_empty()) {
                for event in adapter.parse_stream_line(line) {
                    if guard.terminated() {
                        break;
                    }
                    guard.record(&event);
                    yield Ok(event);
                }
            }
        }
        // Body and guard drop here, releasing the backend connection.
    };

    Box::pin(stream)
}

/// Encode one event as an SSE frame for the caller.
pub fn sse_frame(event: &NormalizedEvent) -> String {
    match event {
        NormalizedEvent::Content(text) => {
            format!("data: {}\n\n", serde_json::json!({ "content": text }))
        }
        NormalizedEvent::Terminal => "data: [DONE]\n\n".to_string(),
    }
}

/// Encode a mid-stream failure as an SSE frame.
pub fn sse_error_frame(err: &RelayError) -> String {
    format!("data: {}\n\n", serde_json::json!({ "error": err.to_string() }))
}

/// Encode an event stream as SSE text frames.
///
/// A failure becomes an error frame followed by `[DONE]`, so the caller sees
/// exactly one terminator on every path.
pub fn encode_sse(
    mut events: EventStream,
) -> impl Stream<Item = Result<String, std::convert::Infallible>> + Send {
    async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    yield Ok::<String, std::convert::Infallible>(sse_frame(&event));
                }
                Err(err) => {
                    yield Ok(sse_error_frame(&err));
                    yield Ok(sse_frame(&NormalizedEvent::Terminal));
                    break;
                }
            }
        }
    }
}
