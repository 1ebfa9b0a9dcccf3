use super::{DeliveryStore, SubscriptionStore};
use crate::error::ApiResult;
use crate::models::{DeliveryListFilter, DeliveryStatus, WebhookDelivery, WebhookSubscription};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct MemorySubscriptionStore {
    subscriptions: RwLock<HashMap<String, WebhookSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, WebhookSubscription>> {
        self.subscriptions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, WebhookSubscription>> {
        self.subscriptions.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SubscriptionStore for MemorySubscriptionStore {
    fn insert(&self, subscription: WebhookSubscription) -> ApiResult<()> {
        self.write().insert(subscription.id.clone(), subscription);
        Ok(())
    }

    fn get(&self, id: &str) -> ApiResult<Option<WebhookSubscription>> {
        Ok(self.read().get(id).cloned())
    }

    fn modify(
        &self,
        id: &str,
        apply: &mut dyn FnMut(&mut WebhookSubscription),
    ) -> ApiResult<Option<WebhookSubscription>> {
        let mut subscriptions = self.write();
        Ok(subscriptions.get_mut(id).map(|sub| {
            apply(sub);
            sub.clone()
        }))
    }

    fn remove(&self, id: &str) -> ApiResult<Option<WebhookSubscription>> {
        Ok(self.write().remove(id))
    }

    fn list(&self) -> ApiResult<Vec<WebhookSubscription>> {
        let mut subs: Vec<_> = self.read().values().cloned().collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(subs)
    }
}

#[derive(Default)]
struct DeliveryState {
    records: HashMap<String, WebhookDelivery>,
    queue: VecDeque<String>,
}

/// Records and queue live under one lock so queue membership and record
/// status never disagree.
#[derive(Default)]
pub struct MemoryDeliveryStore {
    state: Mutex<DeliveryState>,
}

impl MemoryDeliveryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeliveryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DeliveryStore for MemoryDeliveryStore {
    fn enqueue_new(&self, delivery: WebhookDelivery) -> ApiResult<()> {
        let mut state = self.lock();
        state.queue.push_back(delivery.id.clone());
        state.records.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    fn get(&self, id: &str) -> ApiResult<Option<WebhookDelivery>> {
        Ok(self.lock().records.get(id).cloned())
    }

    fn save(&self, delivery: WebhookDelivery) -> ApiResult<()> {
        self.lock().records.insert(delivery.id.clone(), delivery);
        Ok(())
    }

    fn requeue(&self, id: &str) -> ApiResult<bool> {
        let mut state = self.lock();
        if !state.records.contains_key(id) {
            return Ok(false);
        }
        if !state.queue.iter().any(|queued| queued == id) {
            state.queue.push_back(id.to_string());
        }
        Ok(true)
    }

    fn reset_for_retry(&self, id: &str, now: DateTime<Utc>) -> ApiResult<bool> {
        let mut state = self.lock();
        let DeliveryState { records, queue } = &mut *state;

        let Some(delivery) = records.get_mut(id) else {
            return Ok(false);
        };
        if matches!(
            delivery.status,
            DeliveryStatus::Delivered | DeliveryStatus::Delivering
        ) {
            return Ok(false);
        }

        delivery.status = DeliveryStatus::Pending;
        delivery.attempt_count = 0;
        delivery.next_retry_at = None;
        delivery.error = None;
        delivery.error_message = None;
        delivery.updated_at = now;
        if !queue.iter().any(|queued| queued == id) {
            queue.push_back(id.to_string());
        }
        Ok(true)
    }

    fn take_due(&self, now: DateTime<Utc>) -> ApiResult<Vec<WebhookDelivery>> {
        let mut state = self.lock();
        let DeliveryState { records, queue } = &mut *state;

        let mut due = Vec::new();
        queue.retain(|id| match records.get_mut(id) {
            Some(delivery) if delivery.is_due(now) => {
                delivery.status = DeliveryStatus::Delivering;
                due.push(delivery.clone());
                false
            }
            Some(delivery) => delivery.status == DeliveryStatus::Pending,
            None => false,
        });
        Ok(due)
    }

    fn cancel_for_subscription(
        &self,
        subscription_id: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<Vec<String>> {
        let mut state = self.lock();
        let DeliveryState { records, queue } = &mut *state;

        let mut cancelled = Vec::new();
        queue.retain(|id| match records.get_mut(id) {
            Some(delivery) if delivery.subscription_id == subscription_id => {
                delivery.cancel(now);
                cancelled.push(id.clone());
                false
            }
            Some(_) => true,
            None => false,
        });
        Ok(cancelled)
    }

    fn list(&self, filter: &DeliveryListFilter) -> ApiResult<Vec<WebhookDelivery>> {
        let state = self.lock();
        let mut deliveries: Vec<_> = state
            .records
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        deliveries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = filter.limit {
            deliveries.truncate(limit);
        }
        Ok(deliveries)
    }

    fn queue_len(&self) -> ApiResult<usize> {
        Ok(self.lock().queue.len())
    }

    fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> ApiResult<usize> {
        let mut state = self.lock();
        let before = state.records.len();
        state
            .records
            .retain(|_, d| !(d.status.is_terminal() && d.updated_at < cutoff));
        Ok(before - state.records.len())
    }
}
