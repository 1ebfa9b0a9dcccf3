use super::{json_list, json_single, not_found};
use crate::error::WebhookError;
use crate::models::{EventType, NewSubscription, SubscriptionListFilter, SubscriptionPatch};
use crate::web::error::AppResult;
use crate::web::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ListParams {
    pub active: Option<bool>,
    /// Comma-separated event types.
    pub event: Option<String>,
    pub provider: Option<String>,
}

/// POST /api/v1/subscriptions
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(spec): Json<NewSubscription>,
) -> AppResult<Response> {
    let (subscription, secret) = state.system.register_subscription(spec)?;
    let data = serde_json::json!({
        "subscription": subscription,
        "secret": secret,
    });
    Ok((StatusCode::CREATED, json_single(data)).into_response())
}

/// GET /api/v1/subscriptions
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let events = match params.event {
        Some(ref raw) => Some(
            raw.split(',')
                .map(|s| s.trim().parse::<EventType>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(WebhookError::Validation)?,
        ),
        None => None,
    };
    let filter = SubscriptionListFilter {
        active: params.active,
        events,
        provider: params.provider,
    };
    let subs = state.system.list_subscriptions(&filter)?;
    Ok(json_list(subs).into_response())
}

/// GET /api/v1/subscriptions/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    Ok(match state.system.get_subscription(&id)? {
        Some(sub) => json_single(sub).into_response(),
        None => not_found("Subscription not found"),
    })
}

/// PATCH /api/v1/subscriptions/:id
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<SubscriptionPatch>,
) -> AppResult<Response> {
    if !state.system.update_subscription(&id, patch)? {
        return Ok(not_found("Subscription not found"));
    }
    let sub = state
        .system
        .get_subscription(&id)?
        .ok_or(WebhookError::SubscriptionNotFound)?;
    Ok(json_single(sub).into_response())
}

/// DELETE /api/v1/subscriptions/:id
pub async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    Ok(if state.system.remove_subscription(&id)? {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found("Subscription not found")
    })
}

/// POST /api/v1/subscriptions/:id/test
pub async fn test(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    Ok(match state.system.test_subscription(&id)? {
        Some(delivery_id) => (
            StatusCode::ACCEPTED,
            json_single(serde_json::json!({ "delivery_id": delivery_id })),
        )
            .into_response(),
        None => not_found("Subscription not found"),
    })
}
