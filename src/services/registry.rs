use crate::error::{ApiResult, WebhookError};
use crate::models::{
    DeliveryConfig, EventType, NewSubscription, SubscriptionFilters,
    SubscriptionListFilter, SubscriptionPatch, WebhookEventPayload, WebhookSubscription,
};
use crate::services::clock::Clock;
use crate::services::emitter::RESERVED_HEADERS;
use crate::services::signature;
use reqwest::header::{HeaderName, HeaderValue};
use crate::store::{DeliveryStore, SubscriptionStore};
use std::sync::Arc;

/// CRUD and event matching over webhook subscriptions.
pub struct SubscriptionRegistry {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    clock: Arc<dyn Clock>,
    defaults: DeliveryConfig,
}

impl SubscriptionRegistry {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        clock: Arc<dyn Clock>,
        defaults: DeliveryConfig,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            clock,
            defaults,
        }
    }

    /// Register a subscription. The returned secret is not retrievable later.
    pub fn register(&self, spec: NewSubscription) -> ApiResult<(WebhookSubscription, String)> {
        validate_url(&spec.url)?;
        validate_events(&spec.events)?;

        let config = match spec.config {
            Some(ref patch) => self.defaults.merged(patch),
            None => self.defaults.clone(),
        };
        validate_config(&config)?;

        let now = self.clock.now();
        let secret = signature::generate_secret();
        let subscription = WebhookSubscription {
            id: format!("sub_{}", uuid::Uuid::new_v4().simple()),
            url: spec.url,
            events: spec.events.into_iter().collect(),
            active: true,
            secret: secret.clone(),
            filters: spec.filters,
            config,
            metadata: spec.metadata.unwrap_or_default(),
            failure_count: 0,
            last_delivered_at: None,
            created_at: now,
            updated_at: now,
        };

        self.subscriptions.insert(subscription.clone())?;
        tracing::info!(
            subscription_id = %subscription.id,
            url = %subscription.url,
            events = subscription.events.len(),
            "Webhook subscription registered"
        );
        Ok((subscription, secret))
    }

    /// Apply a partial update. Returns `false` when `id` is unknown.
    pub fn update(&self, id: &str, patch: SubscriptionPatch) -> ApiResult<bool> {
        let Some(current) = self.subscriptions.get(id)? else {
            return Ok(false);
        };

        if let Some(ref url) = patch.url {
            validate_url(url)?;
        }
        if let Some(ref events) = patch.events {
            validate_events(events)?;
        }
        let config = patch.config.as_ref().map(|p| current.config.merged(p));
        if let Some(ref config) = config {
            validate_config(config)?;
        }

        let now = self.clock.now();
        let updated = self.subscriptions.modify(id, &mut |sub| {
            if let Some(ref url) = patch.url {
                sub.url = url.clone();
            }
            if let Some(ref events) = patch.events {
                sub.events = events.iter().copied().collect();
            }
            if let Some(active) = patch.active {
                if active && !sub.active {
                    sub.failure_count = 0;
                }
                sub.active = active;
            }
            if let Some(ref filters) = patch.filters {
                sub.filters = Some(filters.clone());
            }
            if let Some(ref config) = config {
                sub.config = config.clone();
            }
            if let Some(ref metadata) = patch.metadata {
                sub.metadata = metadata.clone();
            }
            sub.updated_at = now;
        })?;

        Ok(updated.is_some())
    }

    /// Delete a subscription and cancel everything still queued for it.
    pub fn remove(&self, id: &str) -> ApiResult<bool> {
        if self.subscriptions.remove(id)?.is_none() {
            return Ok(false);
        }
        let cancelled = self
            .deliveries
            .cancel_for_subscription(id, self.clock.now())?;
        tracing::info!(
            subscription_id = %id,
            cancelled_deliveries = cancelled.len(),
            "Webhook subscription removed"
        );
        Ok(true)
    }

    pub fn get(&self, id: &str) -> ApiResult<Option<WebhookSubscription>> {
        self.subscriptions.get(id)
    }

    pub fn list(&self, filter: &SubscriptionListFilter) -> ApiResult<Vec<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .list()?
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect())
    }

    /// Active subscriptions that want this event.
    pub fn find_matching(
        &self,
        event_type: EventType,
        payload: &WebhookEventPayload,
    ) -> ApiResult<Vec<WebhookSubscription>> {
        Ok(self
            .subscriptions
            .list()?
            .into_iter()
            .filter(|s| subscription_matches(s, event_type, payload))
            .collect())
    }
}

pub fn subscription_matches(
    sub: &WebhookSubscription,
    event_type: EventType,
    payload: &WebhookEventPayload,
) -> bool {
    sub.active
        && sub.handles_event(event_type)
        && sub
            .filters
            .as_ref()
            .map_or(true, |filters| filters_match(filters, payload))
}

pub fn filters_match(filters: &SubscriptionFilters, payload: &WebhookEventPayload) -> bool {
    let allowed = |list: &Option<Vec<String>>, value: &Option<String>| match (list, value) {
        (Some(list), Some(value)) => list.iter().any(|v| v == value),
        _ => true,
    };

    allowed(&filters.resource_ids, &payload.metadata.resource_id)
        && allowed(&filters.user_ids, &payload.metadata.user_id)
        && filters
            .conditions
            .iter()
            .all(|(path, expected)| payload.data_at(path) == Some(expected))
}

fn validate_url(raw: &str) -> ApiResult<()> {
    let parsed =
        url::Url::parse(raw).map_err(|e| WebhookError::InvalidUrl(format!("{}: {}", raw, e)))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        "http" | "https" => Err(WebhookError::InvalidUrl(format!("{}: missing host", raw))),
        other => Err(WebhookError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            raw, other
        ))),
    }
}

fn validate_events(events: &[EventType]) -> ApiResult<()> {
    if events.is_empty() {
        return Err(WebhookError::Validation(
            "at least one event type is required".to_string(),
        ));
    }
    Ok(())
}

fn validate_config(config: &DeliveryConfig) -> ApiResult<()> {
    if config.retry_attempts == 0 {
        return Err(WebhookError::Validation(
            "config.retry_attempts must be at least 1".to_string(),
        ));
    }
    if config.timeout_ms == 0 {
        return Err(WebhookError::Validation(
            "config.timeout_ms must be greater than 0".to_string(),
        ));
    }
    if config.signature_header.trim().is_empty() {
        return Err(WebhookError::Validation(
            "config.signature_header must not be empty".to_string(),
        ));
    }

    let signature_header = HeaderName::from_bytes(config.signature_header.as_bytes())
        .map_err(|_| {
            WebhookError::Validation(format!(
                "config.signature_header '{}' is not a valid header name",
                config.signature_header
            ))
        })?;
    if is_reserved(signature_header.as_str()) {
        return Err(WebhookError::Validation(format!(
            "config.signature_header '{}' clashes with a reserved header",
            config.signature_header
        )));
    }

    for (name, value) in &config.headers {
        let parsed = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            WebhookError::Validation(format!("config.headers: invalid header name '{}'", name))
        })?;
        HeaderValue::from_str(value).map_err(|_| {
            WebhookError::Validation(format!("config.headers: invalid value for '{}'", name))
        })?;
        if is_reserved(parsed.as_str()) || parsed == signature_header {
            return Err(WebhookError::Validation(format!(
                "config.headers: '{}' is set by the delivery itself",
                name
            )));
        }
    }
    Ok(())
}

fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}
