use super::{json_list, json_single, not_found};
use crate::models::{EventContext, EventType};
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct EmitRequest {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default)]
    pub data: serde_json::Value,
    pub metadata: EventContext,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

/// POST /api/v1/events
pub async fn emit(State(state): State<Arc<AppState>>, Json(req): Json<EmitRequest>) -> Response {
    let emitted = state.system.emit(req.event_type, req.data, req.metadata);
    let data = serde_json::json!({
        "event_id": emitted.event_id,
        "deliveries": emitted.delivery_ids,
    });
    (StatusCode::ACCEPTED, json_single(data)).into_response()
}

/// GET /api/v1/events
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    json_list(state.system.recent_events(limit)).into_response()
}

/// GET /api/v1/events/:id
pub async fn get(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.system.get_event(&id) {
        Some(event) => json_single(event).into_response(),
        None => not_found("Event not found"),
    }
}
