use super::json_single;
use crate::web::error::AppResult;
use crate::web::state::AppState;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;

/// GET /api/v1/stats
pub async fn statistics(State(state): State<Arc<AppState>>) -> AppResult<Response> {
    let stats = state.system.get_statistics()?;
    let warnings = state.system.health_warnings(&stats);
    let data = serde_json::json!({
        "statistics": stats,
        "warnings": warnings,
    });
    Ok(json_single(data).into_response())
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "scheduler_running": state.system.is_started(),
        "started_at": state.started_at,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
