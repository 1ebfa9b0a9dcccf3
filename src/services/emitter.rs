use crate::config::EventsConfig;
use crate::error::ApiResult;
use crate::models::{
    DeliveryMetrics, DeliveryStatus, EventContext, EventMetadata, EventType, WebhookDelivery,
    WebhookEventPayload, WebhookSubscription,
};
use crate::services::clock::Clock;
use crate::services::registry::SubscriptionRegistry;
use crate::services::signature;
use crate::store::DeliveryStore;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const HEADER_EVENT: &str = "X-Webhook-Event";
pub const HEADER_DELIVERY: &str = "X-Webhook-Delivery";

/// Headers every delivery sets itself. Custom headers may not override them.
pub const RESERVED_HEADERS: [&str; 3] = ["Content-Type", HEADER_EVENT, HEADER_DELIVERY];

/// Result of a single `emit` call.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedEvent {
    pub event_id: String,
    pub delivery_ids: Vec<String>,
}

/// Accepts domain events, archives them and fans them out into deliveries.
pub struct EventEmitter {
    registry: Arc<SubscriptionRegistry>,
    deliveries: Arc<dyn DeliveryStore>,
    clock: Arc<dyn Clock>,
    config: EventsConfig,
    history: RwLock<VecDeque<WebhookEventPayload>>,
}

impl EventEmitter {
    pub fn new(
        registry: Arc<SubscriptionRegistry>,
        deliveries: Arc<dyn DeliveryStore>,
        clock: Arc<dyn Clock>,
        config: EventsConfig,
    ) -> Self {
        Self {
            registry,
            deliveries,
            clock,
            config,
            history: RwLock::new(VecDeque::new()),
        }
    }

    /// Archive the event and enqueue one delivery per matching subscription.
    ///
    /// Always yields the event id. A failure while building one delivery is
    /// logged and does not stop the others.
    pub fn emit(
        &self,
        event_type: EventType,
        data: serde_json::Value,
        context: EventContext,
    ) -> EmittedEvent {
        let payload = self.build_payload(event_type, data, context);
        let event_id = payload.id.clone();
        self.archive(payload.clone());

        let matching = match self.registry.find_matching(event_type, &payload) {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    event_id = %event_id,
                    event_type = %event_type,
                    error = %e,
                    "Failed to resolve matching subscriptions"
                );
                Vec::new()
            }
        };

        if matching.is_empty() {
            tracing::debug!(
                event_id = %event_id,
                event_type = %event_type,
                "No active subscriptions match event"
            );
            return EmittedEvent {
                event_id,
                delivery_ids: Vec::new(),
            };
        }

        let mut delivery_ids = Vec::with_capacity(matching.len());
        for sub in &matching {
            match self.enqueue_delivery(sub, &payload) {
                Ok(id) => delivery_ids.push(id),
                Err(e) => tracing::error!(
                    event_id = %event_id,
                    subscription_id = %sub.id,
                    error = %e,
                    "Failed to create webhook delivery"
                ),
            }
        }

        tracing::info!(
            event_id = %event_id,
            event_type = %event_type,
            deliveries = delivery_ids.len(),
            "Webhook event emitted"
        );
        EmittedEvent {
            event_id,
            delivery_ids,
        }
    }

    /// Send a `webhook.test` event to one subscription, ignoring its event set
    /// and filters. Returns `None` when the subscription does not exist.
    pub fn ping(&self, subscription_id: &str) -> ApiResult<Option<String>> {
        let Some(sub) = self.registry.get(subscription_id)? else {
            return Ok(None);
        };
        let data = serde_json::json!({
            "message": "Webhook test event",
            "subscriptionId": sub.id,
        });
        let payload =
            self.build_payload(EventType::WebhookTest, data, EventContext::new("webhook-events"));
        self.archive(payload.clone());
        self.enqueue_delivery(&sub, &payload).map(Some)
    }

    pub fn get_event(&self, id: &str) -> Option<WebhookEventPayload> {
        self.read().iter().find(|e| e.id == id).cloned()
    }

    /// Newest first.
    pub fn recent_events(&self, limit: usize) -> Vec<WebhookEventPayload> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.read().len()
    }

    /// Read access to the archived history, oldest first.
    pub fn with_history<R>(&self, f: impl FnOnce(&VecDeque<WebhookEventPayload>) -> R) -> R {
        f(&self.read())
    }

    fn build_payload(
        &self,
        event_type: EventType,
        data: serde_json::Value,
        context: EventContext,
    ) -> WebhookEventPayload {
        WebhookEventPayload {
            id: format!("evt_{}", uuid::Uuid::new_v4().simple()),
            event_type,
            version: self.config.payload_version.clone(),
            timestamp: self.clock.now(),
            data,
            metadata: EventMetadata {
                source: context.source,
                resource_id: context.resource_id,
                user_id: context.user_id,
                session_id: context.session_id,
                correlation_id: context.correlation_id,
                environment: self.config.environment.clone(),
            },
        }
    }

    fn archive(&self, payload: WebhookEventPayload) {
        let limit = self.config.history_limit.max(1);
        let mut history = self.write();
        history.push_back(payload);
        if history.len() > limit {
            let evict = (limit / 10).max(history.len() - limit);
            history.drain(..evict);
            tracing::debug!(evicted = evict, retained = history.len(), "Event history trimmed");
        }
    }

    fn enqueue_delivery(
        &self,
        sub: &WebhookSubscription,
        payload: &WebhookEventPayload,
    ) -> ApiResult<String> {
        let delivery = build_delivery(sub, payload, self.clock.now())?;
        let id = delivery.id.clone();
        self.deliveries.enqueue_new(delivery)?;
        Ok(id)
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<WebhookEventPayload>> {
        self.history.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<WebhookEventPayload>> {
        self.history.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Serialize, sign and wrap `payload` for `sub`.
pub fn build_delivery(
    sub: &WebhookSubscription,
    payload: &WebhookEventPayload,
    now: chrono::DateTime<chrono::Utc>,
) -> ApiResult<WebhookDelivery> {
    let body = serde_json::to_string(payload)?;
    let id = format!("dlv_{}", uuid::Uuid::new_v4().simple());

    let mut headers = BTreeMap::new();
    for (name, value) in &sub.config.headers {
        let clashes = RESERVED_HEADERS
            .iter()
            .chain(std::iter::once(&sub.config.signature_header.as_str()))
            .any(|reserved| reserved.eq_ignore_ascii_case(name));
        if !clashes {
            headers.insert(name.clone(), value.clone());
        }
    }
    headers.insert("Content-Type".to_string(), "application/json".to_string());
    headers.insert(
        sub.config.signature_header.clone(),
        signature::signature_header_value(body.as_bytes(), &sub.secret),
    );
    headers.insert(HEADER_EVENT.to_string(), payload.event_type.to_string());
    headers.insert(HEADER_DELIVERY.to_string(), id.clone());

    Ok(WebhookDelivery {
        id,
        subscription_id: sub.id.clone(),
        event_id: payload.id.clone(),
        event_type: payload.event_type,
        payload: payload.clone(),
        metrics: DeliveryMetrics {
            request_size: body.len(),
            ..Default::default()
        },
        body,
        status: DeliveryStatus::Pending,
        attempt_count: 0,
        next_retry_at: None,
        request_headers: headers,
        response_status: None,
        response_body: None,
        error: None,
        error_message: None,
        created_at: now,
        updated_at: now,
        delivered_at: None,
    })
}
