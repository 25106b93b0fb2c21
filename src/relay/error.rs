//! Relay error types
//!
//! Defines the failures a chat or catalog request can end with and how each
//! one is rendered to the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Error types for the relay module
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// Backend was reached but answered with a failure status
    #[error("API Error: {message}")]
    Upstream { status: u16, message: String },
    /// Backend could not be reached, or the exchange broke off
    #[error("{0}")]
    Transport(String),
    /// Inbound request could not be understood
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RelayError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        RelayError::Transport(err.to_string())
    }

    /// HTTP status the caller receives for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RelayError::Transport(format!("Request to backend timed out: {}", e))
        } else if e.is_connect() {
            RelayError::Transport(format!("Failed to connect to AI service: {}", e))
        } else {
            RelayError::Transport(format!("Request error: {}", e))
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        crate::logger::error(
            "relay_error",
            &format!(
                "Returning error response: status={}, message={}",
                status.as_u16(),
                message
            ),
        );

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
