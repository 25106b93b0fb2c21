//! Ollama adapter
//!
//! `/api/chat` with newline-delimited JSON streaming. Termination is signaled
//! by a `done: true` flag on the last object.

use serde::Deserialize;
use serde_json::Value;

use super::BackendAdapter;
use crate::logger;
use crate::relay::context::{join_url, ChatTurn, CompletedAnswer, GenerationSettings, NormalizedEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct OllamaAdapter;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaMessage {
    content: Option<String>,
}

/// One streamed object, or the whole non-streamed reply
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaChatChunk {
    message: Option<OllamaMessage>,
    done: Option<bool>,
    error: Option<String>,
}

impl OllamaChatChunk {
    fn content(self) -> Option<String> {
        self.message.and_then(|m| m.content)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaModel {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OllamaTags {
    models: Option<Vec<OllamaModel>>,
}

impl BackendAdapter for OllamaAdapter {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn chat_url(&self, base_url: &str) -> String {
        join_url(base_url, "/api/chat")
    }

    fn build_chat_body(&self, turns: &[ChatTurn], settings: &GenerationSettings) -> Value {
        serde_json::json!({
            "model": settings.model,
            "messages": turns,
            "stream": settings.stream_response,
            "options": {
                "temperature": settings.temperature,
                "num_predict": settings.max_tokens,
                "top_p": settings.top_p,
                "top_k": settings.top_k,
                "repeat_penalty": settings.repeat_penalty,
            },
        })
    }

    fn parse_stream_line(&self, line: &str) -> Vec<NormalizedEvent> {
        let chunk = match serde_json::from_str::<OllamaChatChunk>(line) {
            Ok(chunk) => chunk,
            Err(e) => {
                logger::debug(
                    "ollama",
                    &format!("Skipping malformed stream line: error={}, len={}", e, line.len()),
                );
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error.as_deref() {
            logger::warn("ollama", &format!("Backend reported error in stream: {}", error));
        }

        let done = chunk.done.unwrap_or(false);
        let mut events = Vec::with_capacity(2);
        if let Some(content) = chunk.content().filter(|c| !c.is_empty()) {
            events.push(NormalizedEvent::Content(content));
        }
        if done {
            events.push(NormalizedEvent::Terminal);
        }
        events
    }

    fn parse_complete_response(&self, body: Value) -> CompletedAnswer {
        let content = serde_json::from_value::<OllamaChatChunk>(body)
            .ok()
            .and_then(OllamaChatChunk::content)
            .unwrap_or_default();
        CompletedAnswer { content }
    }

    fn models_url(&self, base_url: &str) -> String {
        join_url(base_url, "/api/tags")
    }

    fn parse_models(&self, body: Value) -> Vec<String> {
        serde_json::from_value::<OllamaTags>(body)
            .ok()
            .and_then(|tags| tags.models)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.name)
            .collect()
    }
}
