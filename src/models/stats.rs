use super::EventType;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionCounts {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryCounts {
    pub total: usize,
    pub pending: usize,
    pub delivering: usize,
    pub delivered: usize,
    pub dead_letter: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTypeCount {
    pub event_type: EventType,
    pub count: usize,
}

/// Point-in-time snapshot of the webhook system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookStatistics {
    pub subscriptions: SubscriptionCounts,
    pub deliveries: DeliveryCounts,
    /// Percentage in `0.0..=100.0`; 100 when nothing has finished yet.
    pub success_rate: f64,
    pub average_delivery_ms: Option<f64>,
    pub top_event_types: Vec<EventTypeCount>,
    pub total_events: usize,
    pub recent_events_24h: usize,
    pub retry_queue_size: usize,
    pub dead_letter_queue_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HealthWarning {
    LowSuccessRate { success_rate: f64, total_deliveries: usize },
    RetryQueueBacklog { size: usize },
}
