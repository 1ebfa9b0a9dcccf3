pub mod deliveries;
pub mod events;
pub mod stats;
pub mod subscriptions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

fn json_single<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "data": data,
    }))
}

fn json_list<T: Serialize>(data: Vec<T>) -> Json<serde_json::Value> {
    let total = data.len();
    Json(serde_json::json!({
        "data": data,
        "meta": {
            "total": total,
        }
    }))
}

fn not_found(msg: &str) -> Response {
    let body = serde_json::json!({
        "error": "not_found",
        "message": msg,
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
