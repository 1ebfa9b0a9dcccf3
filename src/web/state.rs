use crate::WebhookEventSystem;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct AppState {
    pub system: Arc<WebhookEventSystem>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(system: Arc<WebhookEventSystem>) -> Self {
        Self {
            system,
            started_at: Utc::now(),
        }
    }
}
