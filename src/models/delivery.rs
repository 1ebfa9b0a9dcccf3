use super::{EventType, WebhookEventPayload};
use crate::error::DeliveryErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Delivering,
    Delivered,
    DeadLetter,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Delivering => "DELIVERING",
            Self::Delivered => "DELIVERED",
            Self::DeadLetter => "DEAD_LETTER",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::DeadLetter | Self::Cancelled)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "DELIVERING" => Ok(Self::Delivering),
            "DELIVERED" => Ok(Self::Delivered),
            "DEAD_LETTER" => Ok(Self::DeadLetter),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(format!("unknown delivery status '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryMetrics {
    pub duration_ms: Option<u64>,
    pub request_size: usize,
    pub response_size: Option<usize>,
}

/// One event addressed to one subscription, across all of its attempts.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookDelivery {
    pub id: String,
    pub subscription_id: String,
    pub event_id: String,
    pub event_type: EventType,
    pub payload: WebhookEventPayload,
    /// Exact bytes that were signed and are sent on every attempt.
    #[serde(skip)]
    pub body: String,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub request_headers: BTreeMap<String, String>,
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<DeliveryErrorKind>,
    pub error_message: Option<String>,
    pub metrics: DeliveryMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// Due for dispatch at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Pending && self.next_retry_at.map_or(true, |at| at <= now)
    }

    pub fn fail(&mut self, error: DeliveryErrorKind, now: DateTime<Utc>) {
        self.error_message = Some(error.to_string());
        self.error = Some(error);
        self.updated_at = now;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.status = DeliveryStatus::Cancelled;
        self.next_retry_at = None;
        self.fail(DeliveryErrorKind::SubscriptionMissing, now);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeliveryListFilter {
    pub status: Option<DeliveryStatus>,
    pub subscription_id: Option<String>,
    pub event_id: Option<String>,
    pub limit: Option<usize>,
}

impl DeliveryListFilter {
    pub fn matches(&self, delivery: &WebhookDelivery) -> bool {
        self.status.map_or(true, |s| delivery.status == s)
            && self
                .subscription_id
                .as_deref()
                .map_or(true, |id| delivery.subscription_id == id)
            && self
                .event_id
                .as_deref()
                .map_or(true, |id| delivery.event_id == id)
    }
}
