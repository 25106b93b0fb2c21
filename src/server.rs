use axum::{
    extract::Query,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::error::{AppError, AppResult};
use crate::logger;
use crate::relay::{self, AppState};

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

// ============================================
// Log Viewer API Handlers
// ============================================

#[derive(Deserialize)]
struct LogsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
    level: Option<String>,
    source: Option<String>,
}

impl LogsQuery {
    fn into_query(self) -> AppResult<logger::LogQuery> {
        let level = match self.level.as_deref().filter(|l| !l.trim().is_empty()) {
            Some(raw) => Some(
                logger::LogLevel::from_str(raw)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown log level '{}'", raw)))?,
            ),
            None => None,
        };
        Ok(logger::LogQuery {
            limit: self.limit,
            offset: self.offset,
            level,
            source: self.source,
        })
    }
}

async fn get_logs(Query(q): Query<LogsQuery>) -> AppResult<Json<Value>> {
    let query = q.into_query()?;
    let logs = logger::query_logs(&query)?;
    let total = logger::logs_count(&query)?;
    Ok(Json(json!({
        "logs": logs,
        "total": total,
        "limit": query.limit.unwrap_or(100),
        "offset": query.offset.unwrap_or(0)
    })))
}

async fn clear_logs() -> AppResult<Json<Value>> {
    let deleted = logger::clear_all_logs()?;
    logger::info("server", &format!("Cleared {} log lines", deleted));
    Ok(Json(json!({ "deleted": deleted })))
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();
    Router::new()
        // Health check
        .route("/health", get(health))
        // ============================================
        // Relay
        // ============================================
        .route("/api/chat", post(relay::chat))
        .route("/api/models", get(relay::list_models))
        .route("/api/providers", get(relay::list_providers))
        // ============================================
        // Log Viewer
        // ============================================
        .route("/api/logs", get(get_logs).delete(clear_logs))
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: &str, state: AppState) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    logger::info("server", &format!("Listening on http://{}", listener.local_addr()?));
    axum::serve(listener, app(state)).await?;
    Ok(())
}
