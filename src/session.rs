//! Conversation session state
//!
//! Client-side state for one chat window: history, busy flags, the current
//! settings and the model list. It is an explicit object owned by whoever
//! drives the UI; the relay itself keeps no state between requests.

use serde::{Deserialize, Serialize};

use crate::relay::client::{is_sse_done, parse_sse_data};
use crate::relay::context::{ChatRequest, ChatTurn, GenerationSettings, NormalizedEvent, Provider, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    pub provider: Option<Provider>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<i64>,
    pub top_p: Option<f64>,
    pub top_k: Option<i64>,
    pub repeat_penalty: Option<f64>,
    pub system_prompt: Option<String>,
    pub stream_response: Option<bool>,
}

impl SettingsPatch {
    fn apply(self, s: &mut GenerationSettings) {
        if let Some(v) = self.provider {
            s.provider = v;
        }
        if let Some(v) = self.base_url {
            s.base_url = v;
        }
        if let Some(v) = self.model {
            s.model = v;
        }
        if let Some(v) = self.temperature {
            s.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            s.max_tokens = v;
        }
        if let Some(v) = self.top_p {
            s.top_p = v;
        }
        if let Some(v) = self.top_k {
            s.top_k = v;
        }
        if let Some(v) = self.repeat_penalty {
            s.repeat_penalty = v;
        }
        if let Some(v) = self.system_prompt {
            s.system_prompt = v;
        }
        if let Some(v) = self.stream_response {
            s.stream_response = v;
        }
    }
}

/// What a relay SSE line meant for the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    /// Fragment appended to the pending reply
    Content,
    /// Stream finished
    Done,
    /// Relay reported a failure
    Error(String),
    /// Nothing usable on this line
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct ChatSession {
    messages: Vec<Message>,
    is_loading: bool,
    is_recording: bool,
    settings: GenerationSettings,
    available_models: Vec<String>,
}

impl ChatSession {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn available_models(&self) -> &[String] {
        &self.available_models
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) -> &Message {
        self.messages.push(Message {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.is_recording = recording;
    }

    pub fn update_settings(&mut self, patch: SettingsPatch) {
        patch.apply(&mut self.settings);
    }

    pub fn set_available_models(&mut self, models: Vec<String>) {
        self.available_models = models;
    }

    /// Append a fragment to the last message if it is the assistant's.
    pub fn update_last_message(&mut self, fragment: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant {
                last.content.push_str(fragment);
            }
        }
    }

    /// Record the user's message and build the relay request body.
    ///
    /// The request carries the full history followed by the new turn. The
    /// configured system prompt travels in the settings and is never stored
    /// in the history.
    pub fn chat_request(&mut self, content: &str) -> ChatRequest {
        self.add_message(Role::User, content);
        self.is_loading = true;
        ChatRequest {
            messages: self
                .messages
                .iter()
                .map(|m| ChatTurn::new(m.role, m.content.clone()))
                .collect(),
            settings: self.settings.clone(),
        }
    }

    /// Open an empty assistant message for a streamed reply.
    pub fn begin_reply(&mut self) {
        self.add_message(Role::Assistant, "");
    }

    /// Fold one event into the pending reply. Returns false once finished.
    pub fn apply_event(&mut self, event: &NormalizedEvent) -> bool {
        match event {
            NormalizedEvent::Content(text) => {
                self.update_last_message(text);
                true
            }
            NormalizedEvent::Terminal => {
                self.is_loading = false;
                false
            }
        }
    }

    /// Fold one line of the relay's SSE output into the pending reply.
    pub fn apply_sse_line(&mut self, line: &str) -> SseLine {
        let Some(data) = parse_sse_data(line) else {
            return SseLine::Ignored;
        };
        if is_sse_done(data) {
            self.apply_event(&NormalizedEvent::Terminal);
            return SseLine::Done;
        }

        let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
            return SseLine::Ignored;
        };
        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            return SseLine::Error(error.to_string());
        }
        match value.get("content").and_then(|c| c.as_str()) {
            Some(content) if !content.is_empty() => {
                self.apply_event(&NormalizedEvent::content(content));
                SseLine::Content
            }
            _ => SseLine::Ignored,
        }
    }

    /// Record a complete (non-streamed) reply.
    pub fn complete_reply(&mut self, content: impl Into<String>) {
        self.add_message(Role::Assistant, content);
        self.is_loading = false;
    }

    /// Show a failure in place of a reply.
    pub fn record_error(&mut self, message: &str) {
        let message = if message.is_empty() {
            "Failed to get response"
        } else {
            message
        };
        self.add_message(Role::Assistant, format!("Error: {}", message));
        self.is_loading = false;
    }
}
