//! HTTP client utilities for relaying requests
//!
//! Provides the shared client and the framing helpers used when talking to
//! local backends.

use std::time::{Duration, Instant};

use reqwest::{Client, Response};
use serde_json::Value;

use super::error::{RelayError, RelayResult};
use crate::config::HttpConfig;
use crate::logger;

/// Create the HTTP client shared by all requests.
///
/// No timeout is set unless the operator configured one.
pub fn create_client(cfg: &HttpConfig) -> RelayResult<Client> {
    let mut builder = Client::builder();
    if let Some(secs) = cfg.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = cfg.connect_timeout_secs {
        builder = builder.connect_timeout(Duration::from_secs(secs));
    }

    builder
        .build()
        .map_err(|e| RelayError::Transport(format!("Failed to create HTTP client: {}", e)))
}

/// POST a JSON body and return the raw response on success.
///
/// A non-success status is read to text and returned as `RelayError::Upstream`.
pub async fn post_json(client: &Client, url: &str, body: &Value) -> RelayResult<Response> {
    let start = Instant::now();
    logger::debug("client", &format!("Sending request to: {}", url));

    let response = client.post(url).json(body).send().await.map_err(|e| {
        logger::error("client", &format!("Request failed: url={}, error={}", url, e));
        RelayError::from(e)
    })?;

    logger::debug(
        "client",
        &format!(
            "Response status: {} ({}ms)",
            response.status(),
            start.elapsed().as_millis()
        ),
    );

    ensure_success(response).await
}

/// GET a URL and return the raw response on success.
pub async fn get(client: &Client, url: &str) -> RelayResult<Response> {
    logger::debug("client", &format!("Fetching: {}", url));

    let response = client.get(url).send().await.map_err(|e| {
        logger::error("client", &format!("Request failed: url={}, error={}", url, e));
        RelayError::from(e)
    })?;

    ensure_success(response).await
}

async fn ensure_success(response: Response) -> RelayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            logger::warn(
                "client",
                &format!("Failed to read error body: status={}, error={}", status.as_u16(), e),
            );
            String::new()
        }
    };
    logger::warn(
        "client",
        &format!(
            "Backend returned error: status={}, body={}",
            status.as_u16(),
            truncate(&text, 500)
        ),
    );
    Err(RelayError::Upstream {
        status: status.as_u16(),
        message: text,
    })
}

/// Read a successful response body as text.
pub async fn read_text(response: Response) -> RelayResult<String> {
    response.text().await.map_err(|e| {
        logger::error("client", &format!("Failed to read response body: {}", e));
        RelayError::Transport(format!("Failed to read response: {}", e))
    })
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Parse SSE (Server-Sent Events) data line
pub fn parse_sse_data(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("data:") {
        return Some(rest.strip_prefix(' ').unwrap_or(rest));
    }
    None
}

/// Check if SSE line indicates stream end
pub fn is_sse_done(data: &str) -> bool {
    data.trim() == "[DONE]"
}

/// Parse JSON response text with a fallback for SSE payloads.
///
/// Some backends answer with an event stream even when `stream` is false;
/// the last JSON `data:` payload is taken as the response.
pub fn parse_json_response(response_text: &str) -> Result<Value, serde_json::Error> {
    let trimmed = response_text.trim();
    let parse_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    if response_text.contains("data:") {
        let mut last_value = None;
        for line in response_text.lines() {
            if let Some(data) = parse_sse_data(line) {
                let data = data.trim();
                if data.is_empty() || is_sse_done(data) {
                    continue;
                }
                if let Ok(value) = serde_json::from_str::<Value>(data) {
                    last_value = Some(value);
                }
            }
        }
        if let Some(value) = last_value {
            return Ok(value);
        }
    }

    Err(parse_err)
}

/// Longest partial line kept while waiting for a newline
pub const MAX_PENDING_LINE: usize = 1024 * 1024;

/// Drain complete lines from a byte buffer.
///
/// This handles chunked responses where line breaks may split across reads.
/// A partial line longer than `MAX_PENDING_LINE` is dropped; the rest of that
/// line then fails to parse and is skipped like any malformed line.
pub fn drain_lines(buffer: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    if !chunk.is_empty() {
        buffer.extend_from_slice(chunk);
    }

    let mut lines = Vec::new();
    loop {
        let Some(pos) = buffer.iter().position(|&b| b == b'\n') else {
            break;
        };

        let mut line = buffer.drain(..=pos).collect::<Vec<u8>>();
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        lines.push(String::from_utf8_lossy(&line).to_string());
    }

    if buffer.len() > MAX_PENDING_LINE {
        logger::warn(
            "client",
            &format!("Dropping oversized partial line: {} bytes", buffer.len()),
        );
        buffer.clear();
    }

    lines
}

/// Take whatever is left in the buffer once the body has ended.
pub fn drain_remainder(buffer: &mut Vec<u8>) -> Option<String> {
    if buffer.is_empty() {
        return None;
    }
    let mut rest = std::mem::take(buffer);
    if rest.last() == Some(&b'\r') {
        rest.pop();
    }
    Some(String::from_utf8_lossy(&rest).to_string())
}
