//! Relay context structures
//!
//! Defines the request, settings and event types passed between the HTTP
//! handlers, the relay service and the backend adapters.

use serde::{Deserialize, Serialize};

/// Default backend base URL (Ollama's standard port).
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default system prompt used by fresh sessions.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant running locally on the user's computer. You can help with tasks, answer questions, and search through information.";

/// Supported local inference backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Ollama: `/api/chat`, newline-delimited JSON streaming
    #[default]
    Ollama,
    /// LM Studio: OpenAI-compatible `/v1/chat/completions`, SSE streaming
    #[serde(rename = "lmstudio", alias = "lm-studio")]
    LmStudio,
}

impl Provider {
    /// Parse provider from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Provider::Ollama),
            "lmstudio" | "lm-studio" | "lm_studio" => Some(Provider::LmStudio),
            _ => None,
        }
    }

    /// Get provider name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Ollama => "ollama",
            Provider::LmStudio => "lmstudio",
        }
    }

    /// Human readable backend name
    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Ollama => "Ollama",
            Provider::LmStudio => "LM Studio",
        }
    }

    pub fn all() -> [Provider; 2] {
        [Provider::Ollama, Provider::LmStudio]
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Generation settings supplied by the caller on every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GenerationSettings {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: i64,
    pub top_p: f64,
    pub top_k: i64,
    pub repeat_penalty: f64,
    /// May be empty, in which case no system turn is synthesized.
    pub system_prompt: String,
    pub stream_response: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: "llama2".to_string(),
            temperature: 0.7,
            max_tokens: 2048,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            stream_response: true,
        }
    }
}

/// Inbound body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    #[serde(default)]
    pub settings: GenerationSettings,
}

/// Normalized streaming event, identical for every backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// A fragment of generated text
    Content(String),
    /// End-of-stream sentinel
    Terminal,
}

impl NormalizedEvent {
    pub fn content(text: impl Into<String>) -> Self {
        NormalizedEvent::Content(text.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NormalizedEvent::Terminal)
    }
}

/// The whole reply of a non-streaming request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedAnswer {
    pub content: String,
}

/// Outbound request produced by a backend adapter
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub body: serde_json::Value,
}

/// Build the turn sequence actually sent to the backend.
///
/// A non-empty system prompt becomes one system turn ahead of the caller's
/// turns. A system turn already present in `turns` is kept as is.
pub fn with_system_prompt(turns: &[ChatTurn], system_prompt: &str) -> Vec<ChatTurn> {
    let mut outbound = Vec::with_capacity(turns.len() + 1);
    if !system_prompt.is_empty() {
        outbound.push(ChatTurn::system(system_prompt));
    }
    outbound.extend_from_slice(turns);
    outbound
}

/// Join a base URL and an API path without doubling slashes.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_prepended() {
        let turns = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello"), ChatTurn::user("how?")];
        let outbound = with_system_prompt(&turns, "be brief");

        assert_eq!(outbound.len(), 4);
        assert_eq!(outbound[0], ChatTurn::system("be brief"));
        assert_eq!(&outbound[1..], turns.as_slice());
    }

    #[test]
    fn test_empty_system_prompt_leaves_turns() {
        let turns = vec![ChatTurn::user("hi")];
        assert_eq!(with_system_prompt(&turns, ""), turns);
    }

    #[test]
    fn test_existing_system_turn_not_deduplicated() {
        let turns = vec![ChatTurn::system("caller"), ChatTurn::user("hi")];
        let outbound = with_system_prompt(&turns, "configured");

        assert_eq!(outbound.len(), 3);
        assert_eq!(outbound[0].content, "configured");
        assert_eq!(outbound[1].content, "caller");
        // caller's history is untouched
        assert_eq!(turns.len(), 2);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!(Provider::from_str("ollama"), Some(Provider::Ollama));
        assert_eq!(Provider::from_str("LMStudio"), Some(Provider::LmStudio));
        assert_eq!(Provider::from_str("lm-studio"), Some(Provider::LmStudio));
        assert_eq!(Provider::from_str("openai"), None);
    }

    #[test]
    fn test_settings_deserialize_camel_case() {
        let settings: GenerationSettings = serde_json::from_value(serde_json::json!({
            "provider": "lmstudio",
            "baseUrl": "http://localhost:1234",
            "model": "phi-3",
            "temperature": 0.2,
            "maxTokens": 256,
            "topP": 0.5,
            "topK": 10,
            "repeatPenalty": 1.3,
            "systemPrompt": "",
            "streamResponse": false
        }))
        .unwrap();

        assert_eq!(settings.provider, Provider::LmStudio);
        assert_eq!(settings.base_url, "http://localhost:1234");
        assert_eq!(settings.max_tokens, 256);
        assert_eq!(settings.top_k, 10);
        assert!(settings.system_prompt.is_empty());
        assert!(!settings.stream_response);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = serde_json::from_value::<ChatTurn>(serde_json::json!({
            "role": "tool",
            "content": "x"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://h:1/", "/api/chat"), "http://h:1/api/chat");
        assert_eq!(join_url("http://h:1", "/v1/models"), "http://h:1/v1/models");
    }
}
