//! LM Studio adapter
//!
//! OpenAI-compatible `/v1/chat/completions` with Server-Sent-Events
//! streaming. Termination is signaled by a literal `data: [DONE]` line.

use serde::Deserialize;
use serde_json::Value;

use super::BackendAdapter;
use crate::logger;
use crate::relay::client::{is_sse_done, parse_sse_data};
use crate::relay::context::{join_url, ChatTurn, CompletedAnswer, GenerationSettings, NormalizedEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct LmStudioAdapter;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MessageContent {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Choice {
    delta: Option<MessageContent>,
    message: Option<MessageContent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ChatCompletion {
    choices: Option<Vec<Choice>>,
}

impl ChatCompletion {
    fn first_choice(self) -> Option<Choice> {
        self.choices.and_then(|choices| choices.into_iter().next())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelEntry {
    id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelList {
    data: Option<Vec<ModelEntry>>,
}

impl BackendAdapter for LmStudioAdapter {
    fn name(&self) -> &'static str {
        "lmstudio"
    }

    fn chat_url(&self, base_url: &str) -> String {
        join_url(base_url, "/v1/chat/completions")
    }

    fn build_chat_body(&self, turns: &[ChatTurn], settings: &GenerationSettings) -> Value {
        serde_json::json!({
            "model": settings.model,
            "messages": turns,
            "temperature": settings.temperature,
            "max_tokens": settings.max_tokens,
            "top_p": settings.top_p,
            "stream": settings.stream_response,
        })
    }

    fn parse_stream_line(&self, line: &str) -> Vec<NormalizedEvent> {
        let Some(data) = parse_sse_data(line) else {
            return Vec::new();
        };
        if is_sse_done(data) {
            return vec![NormalizedEvent::Terminal];
        }

        match serde_json::from_str::<ChatCompletion>(data) {
            Ok(chunk) => chunk
                .first_choice()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .filter(|content| !content.is_empty())
                .map(NormalizedEvent::Content)
                .into_iter()
                .collect(),
            Err(e) => {
                logger::debug(
                    "lmstudio",
                    &format!("Skipping malformed SSE payload: error={}, len={}", e, data.len()),
                );
                Vec::new()
            }
        }
    }

    fn parse_complete_response(&self, body: Value) -> CompletedAnswer {
        let content = serde_json::from_value::<ChatCompletion>(body)
            .ok()
            .and_then(ChatCompletion::first_choice)
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default();
        CompletedAnswer { content }
    }

    fn models_url(&self, base_url: &str) -> String {
        join_url(base_url, "/v1/models")
    }

    fn parse_models(&self, body: Value) -> Vec<String> {
        serde_json::from_value::<ModelList>(body)
            .ok()
            .and_then(|list| list.data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::context::Provider;

    #[test]
    fn test_build_chat_body() {
        let settings = GenerationSettings {
            provider: Provider::LmStudio,
            model: "qwen2".to_string(),
            temperature: 0.5,
            max_tokens: 100,
            top_p: 0.95,
            ..Default::default()
        };
        let body = LmStudioAdapter.build_chat_body(&[ChatTurn::user("hi")], &settings);

        assert_eq!(body["model"], "qwen2");
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["top_p"], 0.95);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["content"], "hi");
        // Ollama-only knobs are not sent.
        assert!(body.get("options").is_none());
        assert!(body.get("top_k").is_none());
        assert!(body.get("repeat_penalty").is_none());
    }

    #[test]
    fn test_parse_stream_line_scenario() {
        let a = LmStudioAdapter;
        assert_eq!(
            a.parse_stream_line(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#),
            vec![NormalizedEvent::content("Hi")]
        );
        assert_eq!(a.parse_stream_line("data: [DONE]"), vec![NormalizedEvent::Terminal]);
    }

    #[test]
    fn test_parse_stream_line_ignored() {
        let a = LmStudioAdapter;
        assert!(a.parse_stream_line(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#).is_empty());
        assert!(a.parse_stream_line("event: message").is_empty());
        assert!(a.parse_stream_line(": ping").is_empty());
        assert!(a.parse_stream_line("data: {oops").is_empty());
        assert!(a.parse_stream_line(r#"data: {"choices":[]}"#).is_empty());
        assert!(a
            .parse_stream_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#)
            .is_empty());
        assert!(a
            .parse_stream_line(r#"data: {"choices":[{"delta":{"content":""},"finish_reason":"stop"}]}"#)
            .is_empty());
    }

    #[test]
    fn test_parse_complete_response() {
        let a = LmStudioAdapter;
        let answer = a.parse_complete_response(serde_json::json!({
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Sure."}}]
        }));
        assert_eq!(answer.content, "Sure.");
        assert_eq!(a.parse_complete_response(serde_json::json!({})).content, "");
        assert_eq!(
            a.parse_complete_response(serde_json::json!({"choices": [{"message": {}}]})).content,
            ""
        );
    }

    #[test]
    fn test_parse_models() {
        let a = LmStudioAdapter;
        let models = a.parse_models(serde_json::json!({
            "object": "list",
            "data": [{"id": "qwen2-7b", "object": "model"}, {"id": "phi-3"}]
        }));
        assert_eq!(models, vec!["qwen2-7b", "phi-3"]);
        assert!(a.parse_models(serde_json::json!({"object": "list"})).is_empty());
    }
}
