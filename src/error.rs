use serde::Serialize;
use std::fmt;

/// Errors surfaced to callers of the webhook system.
///
/// Not-found conditions on operational queries are reported as `Option`/`bool`
/// by the services; the `*NotFound` variants exist for the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Delivery not found")]
    DeliveryNotFound,

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    Store(String),

    #[error("HTTP client error: {0}")]
    Http(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, WebhookError>;

/// Why a delivery attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryErrorKind {
    Network { message: String },
    Timeout { after_ms: u64 },
    HttpStatus { code: u16 },
    SubscriptionMissing,
}

impl DeliveryErrorKind {
    /// Whether the dispatcher may schedule another attempt for this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::SubscriptionMissing)
    }
}

impl fmt::Display for DeliveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { message } => write!(f, "network error: {}", message),
            Self::Timeout { after_ms } => write!(f, "request timed out after {}ms", after_ms),
            Self::HttpStatus { code } => write!(f, "HTTP {}", code),
            Self::SubscriptionMissing => write!(f, "subscription no longer exists"),
        }
    }
}
