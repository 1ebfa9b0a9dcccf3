//! Storage seams for subscriptions and deliveries.
//!
//! The system only talks to these traits, so a durable backend can be plugged
//! in without touching the services. [`memory`] holds the default in-process
//! implementation.

pub mod memory;

use crate::error::ApiResult;
use crate::models::{DeliveryListFilter, WebhookDelivery, WebhookSubscription};
use chrono::{DateTime, Utc};

pub use memory::{MemoryDeliveryStore, MemorySubscriptionStore};

pub trait SubscriptionStore: Send + Sync {
    fn insert(&self, subscription: WebhookSubscription) -> ApiResult<()>;

    fn get(&self, id: &str) -> ApiResult<Option<WebhookSubscription>>;

    /// Apply `apply` to the stored record in place. Returns the updated copy,
    /// or `None` when `id` is unknown.
    fn modify(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut WebhookSubscription),
    ) -> ApiResult<Option<WebhookSubscription>>;

    fn remove(&self, id: &str) -> ApiResult<Option<WebhookSubscription>>;

    fn list(&self) -> ApiResult<Vec<WebhookSubscription>>;
}

/// Delivery records plus the retry queue that feeds the dispatcher.
pub trait DeliveryStore: Send + Sync {
    /// Store a new record and append it to the retry queue.
    fn enqueue_new(&self, delivery: WebhookDelivery) -> ApiResult<()>;

    fn get(&self, id: &str) -> ApiResult<Option<WebhookDelivery>>;

    fn save(&self, delivery: WebhookDelivery) -> ApiResult<()>;

    /// Put an existing record back on the retry queue.
    fn requeue(&self, id: &str) -> ApiResult<bool>;

    /// Give a finished or waiting delivery a fresh attempt budget and queue it.
    /// Returns `false` for unknown, delivered and in-flight records. The check
    /// and the reset happen under one lock.
    fn reset_for_retry(&self, id: &str, now: DateTime<Utc>) -> ApiResult<bool>;

    /// Remove and return every queued delivery that is due at `now`, marking
    /// each one `Delivering` so a concurrent manual retry leaves it alone.
    fn take_due(&self, now: DateTime<Utc>) -> ApiResult<Vec<WebhookDelivery>>;

    /// Drop all queued deliveries of a subscription and mark them cancelled,
    /// in one step. Returns the affected delivery ids.
    fn cancel_for_subscription(
        &self,
        subscription_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<Vec<String>>;

    /// Newest first.
    fn list(&self, filter: &DeliveryListFilter) -> ApiResult<Vec<WebhookDelivery>>;

    fn queue_len(&self) -> ApiResult<usize>;

    /// Delete terminal records last touched before `cutoff`.
    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> ApiResult<usize>;
}
