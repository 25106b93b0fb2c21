//! Backend adapters
//!
//! Translate a normalized chat request into each backend's native request
//! shape, and each backend's response framing back into `NormalizedEvent`s.
//! Nothing outside this module branches on provider identity.

pub mod lmstudio;
pub mod ollama;

use serde_json::Value;

use crate::relay::client;
use crate::relay::context::{
    with_system_prompt, ChatTurn, CompletedAnswer, GenerationSettings, NormalizedEvent,
    OutboundRequest, Provider,
};
use crate::relay::error::{RelayError, RelayResult};

/// Trait interface for implementing backend-specific behavior
///
/// Each backend implements this trait to handle:
/// - Endpoint selection
/// - Request body shaping (field names, nesting)
/// - Stream line framing and termination signaling
/// - Complete response and model catalog decoding
pub trait BackendAdapter: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Chat endpoint for the given base URL
    fn chat_url(&self, base_url: &str) -> String;

    /// Build the outbound chat body from the already-prepared turn sequence
    fn build_chat_body(&self, turns: &[ChatTurn], settings: &GenerationSettings) -> Value;

    /// Parse one non-blank stream line into zero or more events
    fn parse_stream_line(&self, line: &str) -> Vec<NormalizedEvent>;

    /// Extract the reply from a complete (non-streamed) response
    fn parse_complete_response(&self, body: Value) -> CompletedAnswer;

    /// Model catalog endpoint for the given base URL
    fn models_url(&self, base_url: &str) -> String;

    /// Extract model identifiers from a catalog response
    fn parse_models(&self, body: Value) -> Vec<String>;
}

/// Adapter enum for dispatching to the correct backend
#[derive(Debug, Clone, Copy)]
pub enum Adapter {
    Ollama(ollama::OllamaAdapter),
    LmStudio(lmstudio::LmStudioAdapter),
}

impl Adapter {
    pub fn name(&self) -> &'static str {
        match self {
            Adapter::Ollama(a) => a.name(),
            Adapter::LmStudio(a) => a.name(),
        }
    }

    pub fn chat_url(&self, base_url: &str) -> String {
        match self {
            Adapter::Ollama(a) => a.chat_url(base_url),
            Adapter::LmStudio(a) => a.chat_url(base_url),
        }
    }

    pub fn build_chat_body(&self, turns: &[ChatTurn], settings: &GenerationSettings) -> Value {
        match self {
            Adapter::Ollama(a) => a.build_chat_body(turns, settings),
            Adapter::LmStudio(a) => a.build_chat_body(turns, settings),
        }
    }

    pub fn parse_stream_line(&self, line: &str) -> Vec<NormalizedEvent> {
        match self {
            Adapter::Ollama(a) => a.parse_stream_line(line),
            Adapter::LmStudio(a) => a.parse_stream_line(line),
        }
    }

    pub fn parse_complete_response(&self, body: Value) -> CompletedAnswer {
        match self {
            Adapter::Ollama(a) => a.parse_complete_response(body),
            Adapter::LmStudio(a) => a.parse_complete_response(body),
        }
    }

    pub fn models_url(&self, base_url: &str) -> String {
        match self {
            Adapter::Ollama(a) => a.models_url(base_url),
            Adapter::LmStudio(a) => a.models_url(base_url),
        }
    }

    pub fn parse_models(&self, body: Value) -> Vec<String> {
        match self {
            Adapter::Ollama(a) => a.parse_models(body),
            Adapter::LmStudio(a) => a.parse_models(body),
        }
    }
}

/// Get the adapter for a provider
pub fn get_adapter(provider: Provider) -> Adapter {
    match provider {
        Provider::Ollama => Adapter::Ollama(ollama::OllamaAdapter),
        Provider::LmStudio => Adapter::LmStudio(lmstudio::LmStudioAdapter),
    }
}

/// Build the outbound request for a conversation.
///
/// The configured system prompt is synthesized here and only here, so it
/// never leaks back into the caller's history.
pub fn build_request(turns: &[ChatTurn], settings: &GenerationSettings) -> OutboundRequest {
    let adapter = get_adapter(settings.provider);
    let outbound_turns = with_system_prompt(turns, &settings.system_prompt);
    OutboundRequest {
        url: adapter.chat_url(&settings.base_url),
        body: adapter.build_chat_body(&outbound_turns, settings),
    }
}

/// Parse a self-contained chunk of stream bytes.
///
/// The chunk is split into lines, blank lines are dropped and every other
/// line goes through the provider's line parser. The streaming pipeline
/// buffers partial lines across reads instead of calling this per chunk.
pub fn parse_stream_chunk(raw: &[u8], provider: Provider) -> Vec<NormalizedEvent> {
    let adapter = get_adapter(provider);
    String::from_utf8_lossy(raw)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .flat_map(|line| adapter.parse_stream_line(line))
        .collect()
}

/// Parse a complete response body.
///
/// Missing content is an empty answer; a body that is not JSON at all is a
/// transport-level failure.
pub fn parse_complete_response(raw: &str, provider: Provider) -> RelayResult<CompletedAnswer> {
    let value = client::parse_json_response(raw).map_err(|e| {
        RelayError::Transport(format!("Malformed response from {}: {}", provider.display_name(), e))
    })?;
    Ok(get_adapter(provider).parse_complete_response(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: Provider, system_prompt: &str) -> GenerationSettings {
        GenerationSettings {
            provider,
            base_url: "http://localhost:9999/".to_string(),
            system_prompt: system_prompt.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_request_endpoints() {
        let turns = vec![ChatTurn::user("hi")];
        let req = build_request(&turns, &settings(Provider::Ollama, ""));
        assert_eq!(req.url, "http://localhost:9999/api/chat");

        let req = build_request(&turns, &settings(Provider::LmStudio, ""));
        assert_eq!(req.url, "http://localhost:9999/v1/chat/completions");
    }

    #[test]
    fn test_build_request_system_turn_first() {
        let turns = vec![ChatTurn::user("one"), ChatTurn::assistant("two"), ChatTurn::user("three")];
        for provider in Provider::all() {
            let req = build_request(&turns, &settings(provider, "sys"));
            let messages = req.body["messages"].as_array().unwrap();
            assert_eq!(messages.len(), 4);
            assert_eq!(messages[0]["role"], "system");
            assert_eq!(messages[0]["content"], "sys");
            let rest: Vec<&str> = messages[1..]
                .iter()
                .map(|m| m["content"].as_str().unwrap())
                .collect();
            assert_eq!(rest, vec!["one", "two", "three"]);
        }
    }

    #[test]
    fn test_parse_stream_chunk_ollama() {
        let raw = b"{\"message\":{\"content\":\"Hel\"}}\n\n{\"message\":{\"content\":\"lo\"}}\n{\"done\":true}\n";
        let events = parse_stream_chunk(raw, Provider::Ollama);
        assert_eq!(
            events,
            vec![
                NormalizedEvent::content("Hel"),
                NormalizedEvent::content("lo"),
                NormalizedEvent::Terminal,
            ]
        );
    }

    #[test]
    fn test_parse_stream_chunk_lmstudio() {
        let raw = b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
        let events = parse_stream_chunk(raw, Provider::LmStudio);
        assert_eq!(events, vec![NormalizedEvent::content("Hi"), NormalizedEvent::Terminal]);
    }

    #[test]
    fn test_malformed_lines_skipped_in_order() {
        let raw = b"{\"message\":{\"content\":\"a\"}}\n{not json\n{\"message\":{\"content\":\"b\"}}\n]]\n{\"message\":{\"content\":\"c\"}}\n";
        let events = parse_stream_chunk(raw, Provider::Ollama);
        assert_eq!(
            events,
            vec![
                NormalizedEvent::content("a"),
                NormalizedEvent::content("b"),
                NormalizedEvent::content("c"),
            ]
        );
    }

    #[test]
    fn test_parse_complete_response() {
        let answer =
            parse_complete_response(r#"{"message":{"content":"Hello"}}"#, Provider::Ollama).unwrap();
        assert_eq!(answer.content, "Hello");

        let answer = parse_complete_response(r#"{"choices":[]}"#, Provider::LmStudio).unwrap();
        assert_eq!(answer.content, "");

        let err = parse_complete_response("<html>", Provider::Ollama).unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }

    #[test]
    fn test_stream_and_complete_content_agree() {
        let streamed: String = parse_stream_chunk(
            b"data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\ndata: {\"choices\":[{\"delta\":{\"content\":\", world\"}}]}\ndata: [DONE]\n",
            Provider::LmStudio,
        )
        .into_iter()
        .filter_map(|e| match e {
            NormalizedEvent::Content(text) => Some(text),
            NormalizedEvent::Terminal => None,
        })
        .collect();

        let complete = parse_complete_response(
            r#"{"choices":[{"message":{"role":"assistant","content":"Hello, world"}}]}"#,
            Provider::LmStudio,
        )
        .unwrap();

        assert_eq!(streamed, complete.content);
    }
}
