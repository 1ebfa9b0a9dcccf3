use super::{json_list, json_single, not_found};
use crate::models::DeliveryListFilter;
use crate::web::error::AppResult;
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

const MAX_LIMIT: usize = 1000;

/// GET /api/v1/deliveries
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(mut filter): Query<DeliveryListFilter>,
) -> AppResult<Response> {
    filter.limit = Some(filter.limit.unwrap_or(100).min(MAX_LIMIT));
    let deliveries = state.system.list_deliveries(&filter)?;
    Ok(json_list(deliveries).into_response())
}

/// GET /api/v1/deliveries/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    Ok(match state.system.get_delivery(&id)? {
        Some(delivery) => json_single(delivery).into_response(),
        None => not_found("Delivery not found"),
    })
}

/// POST /api/v1/deliveries/:id/retry
pub async fn retry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let queued = state.system.retry_delivery(&id)?;
    if !queued && state.system.get_delivery(&id)?.is_none() {
        return Ok(not_found("Delivery not found"));
    }
    let status = if queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::CONFLICT
    };
    Ok((status, json_single(serde_json::json!({ "queued": queued }))).into_response())
}
