//! Relay service
//!
//! Forwards one chat request to the selected backend and hands back either a
//! live event stream or the completed answer.

use reqwest::Client;

use super::client;
use super::context::{ChatTurn, CompletedAnswer, GenerationSettings};
use super::error::RelayResult;
use super::stream::{normalize_stream, EventStream};
use crate::adapters::{self, get_adapter};
use crate::logger;

/// Result of a successful relay call
pub enum RelayReply {
    /// Incremental events; the caller drives reading by polling
    Stream(EventStream),
    /// The whole reply, for `streamResponse: false`
    Complete(CompletedAnswer),
}

impl std::fmt::Debug for RelayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayReply::Stream(_) => f.write_str("RelayReply::Stream(..)"),
            RelayReply::Complete(answer) => f.debug_tuple("RelayReply::Complete").field(answer).finish(),
        }
    }
}

/// Stateless relay; the client is only a connection pool.
#[derive(Clone)]
pub struct RelayService {
    client: Client,
}

impl RelayService {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Relay a conversation to the backend named in `settings`.
    pub async fn handle(
        &self,
        turns: &[ChatTurn],
        settings: &GenerationSettings,
        request_id: &str,
    ) -> RelayResult<RelayReply> {
        let adapter = get_adapter(settings.provider);
        let outbound = adapters::build_request(turns, settings);

        logger::info(
            "relay",
            &format!(
                "Request started: request_id={}, backend={}, model={}, turns={}, streaming={}",
                request_id,
                adapter.name(),
                settings.model,
                turns.len(),
                settings.stream_response
            ),
        );

        let response = client::post_json(&self.client, &outbound.url, &outbound.body).await?;

        if settings.stream_response {
            let body = response.bytes_stream();
            return Ok(RelayReply::Stream(normalize_stream(
                adapter,
                body,
                request_id.to_string(),
            )));
        }

        let text = client::read_text(response).await?;
        let answer = adapters::parse_complete_response(&text, settings.provider)?;

        logger::info(
            "relay",
            &format!(
                "Request completed: request_id={}, backend={}, chars={}",
                request_id,
                adapter.name(),
                answer.content.chars().count()
            ),
        );

        Ok(RelayReply::Complete(answer))
    }
}
