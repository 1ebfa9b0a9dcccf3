use super::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub url: String,
    pub events: BTreeSet<EventType>,
    pub active: bool,
    /// Signing key. Handed out once by `register` and never serialized.
    #[serde(skip_serializing)]
    pub secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<SubscriptionFilters>,
    pub config: DeliveryConfig,
    pub metadata: SubscriptionMetadata,
    pub failure_count: u32,
    pub last_delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookSubscription {
    pub fn handles_event(&self, event_type: EventType) -> bool {
        self.events.contains(&event_type)
    }
}

/// Narrows which events of a subscribed type are delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
    /// Dot-path into the event `data` mapped to the value it must equal.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub signature_header: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Caller overrides merged over [`DeliveryConfig`] defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryConfigPatch {
    pub timeout_ms: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub signature_header: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
}

impl DeliveryConfig {
    pub fn merged(&self, patch: &DeliveryConfigPatch) -> Self {
        Self {
            timeout_ms: patch.timeout_ms.unwrap_or(self.timeout_ms),
            retry_attempts: patch.retry_attempts.unwrap_or(self.retry_attempts),
            retry_delay_ms: patch.retry_delay_ms.unwrap_or(self.retry_delay_ms),
            signature_header: patch
                .signature_header
                .clone()
                .unwrap_or_else(|| self.signature_header.clone()),
            headers: patch.headers.clone().unwrap_or_else(|| self.headers.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

/// Input to `SubscriptionRegistry::register`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSubscription {
    pub url: String,
    pub events: Vec<EventType>,
    #[serde(default)]
    pub config: Option<DeliveryConfigPatch>,
    #[serde(default)]
    pub filters: Option<SubscriptionFilters>,
    #[serde(default)]
    pub metadata: Option<SubscriptionMetadata>,
}

impl NewSubscription {
    pub fn new(url: impl Into<String>, events: Vec<EventType>) -> Self {
        Self {
            url: url.into(),
            events,
            config: None,
            filters: None,
            metadata: None,
        }
    }

    pub fn with_config(mut self, config: DeliveryConfigPatch) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_filters(mut self, filters: SubscriptionFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_metadata(mut self, metadata: SubscriptionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Partial update. Identity and secret are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionPatch {
    pub url: Option<String>,
    pub events: Option<Vec<EventType>>,
    pub active: Option<bool>,
    pub filters: Option<SubscriptionFilters>,
    pub config: Option<DeliveryConfigPatch>,
    pub metadata: Option<SubscriptionMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionListFilter {
    pub active: Option<bool>,
    #[serde(default)]
    pub events: Option<Vec<EventType>>,
    pub provider: Option<String>,
}

impl SubscriptionListFilter {
    pub fn matches(&self, sub: &WebhookSubscription) -> bool {
        if let Some(active) = self.active {
            if sub.active != active {
                return false;
            }
        }
        if let Some(ref events) = self.events {
            if !events.iter().any(|e| sub.events.contains(e)) {
                return false;
            }
        }
        if let Some(ref provider) = self.provider {
            if sub.metadata.provider.as_deref() != Some(provider.as_str()) {
                return false;
            }
        }
        true
    }
}
