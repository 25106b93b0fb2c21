//! Model catalog fetcher
//!
//! Asks a backend which models it currently has available.

use reqwest::Client;

use super::client;
use super::context::Provider;
use super::error::{RelayError, RelayResult};
use crate::adapters::get_adapter;
use crate::logger;

/// List the model identifiers a backend exposes.
///
/// A response without a model list is an empty catalog, not an error.
pub async fn list_models(
    http: &Client,
    provider: Provider,
    base_url: &str,
) -> RelayResult<Vec<String>> {
    let adapter = get_adapter(provider);
    let url = adapter.models_url(base_url);

    let response = client::get(http, &url).await?;
    let text = client::read_text(response).await?;
    let body = serde_json::from_str(&text).map_err(|e| {
        RelayError::Transport(format!(
            "Malformed model list from {}: {}",
            provider.display_name(),
            e
        ))
    })?;

    let models = adapter.parse_models(body);
    logger::debug(
        "catalog",
        &format!("Fetched {} models from {} ({})", models.len(), adapter.name(), url),
    );
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_list_models_ollama() {
        let app = Router::new().route(
            "/api/tags",
            get(|| async { Json(json!({"models": [{"name": "llama2"}, {"name": "mistral"}]})) }),
        );
        let base = spawn_backend(app).await;

        let models = list_models(&Client::new(), Provider::Ollama, &base).await.unwrap();
        assert_eq!(models, vec!["llama2", "mistral"]);
    }

    #[tokio::test]
    async fn test_list_models_lmstudio() {
        let app = Router::new().route(
            "/v1/models",
            get(|| async { Json(json!({"object": "list", "data": [{"id": "phi-3"}]})) }),
        );
        let base = spawn_backend(app).await;

        let models = list_models(&Client::new(), Provider::LmStudio, &format!("{}/", base))
            .await
            .unwrap();
        assert_eq!(models, vec!["phi-3"]);
    }

    #[tokio::test]
    async fn test_list_models_missing_list() {
        let app = Router::new().route("/api/tags", get(|| async { Json(json!({})) }));
        let base = spawn_backend(app).await;

        let models = list_models(&Client::new(), Provider::Ollama, &base).await.unwrap();
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn test_list_models_upstream_error() {
        let app = Router::new().route(
            "/v1/models",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "loading") }),
        );
        let base = spawn_backend(app).await;

        let err = list_models(&Client::new(), Provider::LmStudio, &base)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RelayError::Upstream {
                status: 503,
                message: "loading".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_list_models_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = list_models(&Client::new(), Provider::Ollama, &format!("http://{}", addr))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(_)));
    }
}
