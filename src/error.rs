//! Application error types
//!
//! Errors from configuration, local IO and the log database. Relay failures
//! have their own type in `relay::error`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

/// Application-wide error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(e) => {
                crate::logger::error("server", &format!("Database error: {}", e));
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Io(e) => {
                crate::logger::error("server", &format!("IO error: {}", e));
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Config(msg) => {
                crate::logger::error("server", &format!("Config error: {}", msg));
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Result type alias for app operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::BadRequest("level".into()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Config("broken".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
