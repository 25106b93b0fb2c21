//! Relay module
//!
//! Relays chat turns to a local inference backend (Ollama or LM Studio) and
//! streams the reply back in one backend-independent shape.
//!
//! ## Architecture
//!
//! ```text
//! Request -> Handler -> RelayService -> Adapter (request) -> Backend
//!                            |                                  |
//!                            v                                  v
//!                      EventStream  <-  Adapter (framing)  <- body bytes
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /api/chat` - chat relay, SSE or single JSON reply
//! - `GET /api/models` - model catalog of a backend
//! - `GET /api/providers` - supported backends
//!
//! ## Components
//!
//! - `context`: request, settings and event types
//! - `client`: HTTP client and line framing helpers
//! - `stream`: byte stream to event stream pipeline, SSE encoding
//! - `service`: the relay itself
//! - `catalog`: model listing
//! - `error`: error types

pub mod catalog;
pub mod client;
pub mod context;
pub mod error;
pub mod service;
pub mod stream;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::config::BackendConfig;
use crate::logger;

pub use context::{
    ChatRequest, ChatTurn, CompletedAnswer, GenerationSettings, NormalizedEvent, Provider, Role,
};
pub use error::{RelayError, RelayResult};
pub use service::{RelayReply, RelayService};
pub use stream::EventStream;

/// Shared per-process state handed to every handler.
///
/// Holds nothing that changes between requests.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayService,
    pub defaults: BackendConfig,
}

impl AppState {
    pub fn new(relay: RelayService, defaults: BackendConfig) -> Self {
        Self { relay, defaults }
    }
}

// ============================================================================
// Chat
// ============================================================================

/// Chat relay endpoint
///
/// Route: POST /api/chat
///
/// Streams `data: {"content": ...}` frames terminated by `data: [DONE]` when
/// `settings.streamResponse` is true, otherwise returns `{ "content": ... }`.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return RelayError::InvalidRequest(rejection.body_text()).into_response();
        }
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    match state
        .relay
        .handle(&request.messages, &request.settings, &request_id)
        .await
    {
        Ok(RelayReply::Stream(events)) => sse_response(events),
        Ok(RelayReply::Complete(answer)) => Json(answer).into_response(),
        Err(e) => e.into_response(),
    }
}

fn sse_response(events: EventStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/event-stream")
        .header("cache-control", "no-cache")
        .header("connection", "keep-alive")
        .body(Body::from_stream(stream::encode_sse(events)))
        .unwrap_or_else(|e| {
            logger::error("relay", &format!("Failed to build stream response: {}", e));
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

// ============================================================================
// Model catalog
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelsQuery {
    provider: Option<String>,
    base_url: Option<String>,
}

/// List models available on a backend
///
/// Route: GET /api/models?provider=ollama&baseUrl=http://localhost:11434
pub async fn list_models(
    State(state): State<AppState>,
    Query(q): Query<ModelsQuery>,
) -> Response {
    let provider = match q.provider.as_deref().filter(|p| !p.trim().is_empty()) {
        None => state.defaults.provider,
        Some(raw) => match Provider::from_str(raw) {
            Some(provider) => provider,
            None => {
                return RelayError::InvalidRequest(format!("Unknown provider '{}'", raw))
                    .into_response();
            }
        },
    };
    let base_url = q
        .base_url
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| state.defaults.base_url.clone());

    match catalog::list_models(state.relay.client(), provider, &base_url).await {
        Ok(models) => Json(serde_json::json!({ "models": models })).into_response(),
        Err(e) => e.into_response(),
    }
}

// ============================================================================
// Utility Endpoints
// ============================================================================

/// List supported backends
pub fn providers() -> Vec<&'static str> {
    Provider::all().iter().map(Provider::as_str).collect()
}

/// List backends endpoint
pub async fn list_providers() -> Json<Value> {
    Json(serde_json::json!({ "providers": providers() }))
}
