use super::handlers;
use super::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/v1/subscriptions",
            get(handlers::subscriptions::list).post(handlers::subscriptions::create),
        )
        .route(
            "/api/v1/subscriptions/:id",
            get(handlers::subscriptions::get)
                .patch(handlers::subscriptions::update)
                .delete(handlers::subscriptions::remove),
        )
        .route(
            "/api/v1/subscriptions/:id/test",
            post(handlers::subscriptions::test),
        )
        .route(
            "/api/v1/events",
            get(handlers::events::list).post(handlers::events::emit),
        )
        .route("/api/v1/events/:id", get(handlers::events::get))
        .route("/api/v1/deliveries", get(handlers::deliveries::list))
        .route("/api/v1/deliveries/:id", get(handlers::deliveries::get))
        .route(
            "/api/v1/deliveries/:id/retry",
            post(handlers::deliveries::retry),
        )
        .route("/api/v1/stats", get(handlers::stats::statistics))
}

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(handlers::stats::health))
}
