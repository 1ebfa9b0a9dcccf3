//! Retry engine: drains due deliveries from the queue, performs the HTTP
//! attempts concurrently and applies the backoff / dead-letter policy.
//!
//! Per delivery:
//!
//! ```text
//! PENDING --due--> DELIVERING --2xx--> DELIVERED
//! DELIVERING --failure, attempts < max--> PENDING (next_retry_at = now + backoff)
//! DELIVERING --failure, attempts == max--> DEAD_LETTER
//! PENDING --subscription gone--> CANCELLED
//! ```

use crate::error::{ApiResult, DeliveryErrorKind};
use crate::models::{DeliveryStatus, WebhookDelivery, WebhookSubscription};
use crate::services::backoff::BackoffPolicy;
use crate::services::clock::Clock;
use crate::services::metrics::{url_path, MetricsSink, RequestSample};
use crate::services::sender::{DeliverySender, OutboundRequest, SendResponse};
use crate::store::{DeliveryStore, SubscriptionStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub backoff: BackoffPolicy,
    /// Consecutive dead letters after which a subscription is deactivated.
    pub dead_letter_threshold: u32,
    pub max_response_body: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            dead_letter_threshold: 5,
            max_response_body: 4096,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Another tick was still running, nothing was done.
    pub skipped: bool,
    pub attempted: usize,
    pub delivered: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
    pub deferred: usize,
}

struct TickGuard<'a>(&'a AtomicBool);

impl<'a> TickGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

type AttemptResult = (Result<SendResponse, DeliveryErrorKind>, Duration);

pub struct DeliveryDispatcher {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    sender: Arc<dyn DeliverySender>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<dyn MetricsSink>>,
    settings: DispatcherSettings,
    running: AtomicBool,
}

impl DeliveryDispatcher {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        sender: Arc<dyn DeliverySender>,
        clock: Arc<dyn Clock>,
        settings: DispatcherSettings,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            sender,
            clock,
            metrics: None,
            settings,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Process every due delivery once. Never overlaps with itself.
    pub async fn tick(&self) -> TickReport {
        let Some(_guard) = TickGuard::acquire(&self.running) else {
            tracing::debug!(target: "webhook_delivery", "Previous tick still running, skipping");
            return TickReport {
                skipped: true,
                ..Default::default()
            };
        };

        match self.process_due().await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(target: "webhook_delivery", error = %e, "Dispatcher tick failed");
                TickReport::default()
            }
        }
    }

    /// Reset a delivery that has not been delivered and queue it for the next
    /// tick with a fresh attempt budget.
    pub fn retry_delivery(&self, id: &str) -> ApiResult<bool> {
        if !self.deliveries.reset_for_retry(id, self.clock.now())? {
            return Ok(false);
        }

        tracing::info!(target: "webhook_delivery", delivery_id = %id, "Manual redelivery queued");
        Ok(true)
    }

    async fn process_due(&self) -> ApiResult<TickReport> {
        let now = self.clock.now();
        let due = self.deliveries.take_due(now)?;
        let mut report = TickReport::default();
        if due.is_empty() {
            return Ok(report);
        }

        let mut batch = Vec::with_capacity(due.len());
        for mut delivery in due {
            match self.subscriptions.get(&delivery.subscription_id)? {
                None => {
                    delivery.cancel(now);
                    tracing::warn!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        subscription_id = %delivery.subscription_id,
                        "Subscription missing, delivery cancelled"
                    );
                    self.deliveries.save(delivery)?;
                    report.cancelled += 1;
                }
                Some(sub) if !sub.active => {
                    // Held until the subscription is reactivated or removed.
                    delivery.status = DeliveryStatus::Pending;
                    let id = delivery.id.clone();
                    self.deliveries.save(delivery)?;
                    self.deliveries.requeue(&id)?;
                    report.deferred += 1;
                }
                Some(sub) => {
                    delivery.status = DeliveryStatus::Delivering;
                    delivery.attempt_count += 1;
                    delivery.updated_at = now;
                    self.deliveries.save(delivery.clone())?;
                    batch.push((delivery, sub));
                }
            }
        }

        let handles: Vec<_> = batch
            .iter()
            .map(|(delivery, sub)| {
                let sender = Arc::clone(&self.sender);
                let request = OutboundRequest {
                    url: sub.url.clone(),
                    headers: delivery.request_headers.clone(),
                    body: delivery.body.clone(),
                    timeout: Duration::from_millis(sub.config.timeout_ms),
                };
                tokio::spawn(attempt(sender, request))
            })
            .collect();

        report.attempted = handles.len();
        for ((delivery, sub), handle) in batch.into_iter().zip(handles) {
            let outcome = handle.await.unwrap_or_else(|e| {
                (
                    Err(DeliveryErrorKind::Network {
                        message: format!("delivery task failed: {}", e),
                    }),
                    Duration::ZERO,
                )
            });
            let delivery_id = delivery.id.clone();
            match self.apply_outcome(delivery, &sub, outcome) {
                Ok(DeliveryStatus::Delivered) => report.delivered += 1,
                Ok(DeliveryStatus::Pending) => report.retried += 1,
                Ok(DeliveryStatus::DeadLetter) => report.dead_lettered += 1,
                Ok(DeliveryStatus::Cancelled) => report.cancelled += 1,
                Ok(DeliveryStatus::Delivering) => {}
                Err(e) => tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %delivery_id,
                    error = %e,
                    "Failed to record delivery outcome"
                ),
            }
        }

        Ok(report)
    }

    fn apply_outcome(
        &self,
        mut delivery: WebhookDelivery,
        sub: &WebhookSubscription,
        (result, elapsed): AttemptResult,
    ) -> ApiResult<DeliveryStatus> {
        let now = self.clock.now();
        let duration_ms = elapsed.as_millis() as u64;
        delivery.metrics.duration_ms = Some(duration_ms);
        delivery.updated_at = now;

        if let Some(ref sink) = self.metrics {
            sink.record(
                &delivery.id,
                RequestSample {
                    method: "POST",
                    path: url_path(&sub.url),
                    status_code: result.as_ref().map(|r| r.status).unwrap_or(0),
                    duration_ms,
                },
            );
        }

        let error = match result {
            Ok(response) => {
                let success = response.is_success();
                delivery.response_status = Some(response.status);
                delivery.metrics.response_size = Some(response.body.len());
                delivery.response_body =
                    Some(truncate(response.body, self.settings.max_response_body));
                if success {
                    return self.mark_delivered(delivery, now);
                }
                DeliveryErrorKind::HttpStatus {
                    code: response.status,
                }
            }
            Err(kind) => kind,
        };

        let attempt = delivery.attempt_count;
        let retryable = error.is_retryable();
        delivery.fail(error, now);

        if attempt >= sub.config.retry_attempts || !retryable {
            delivery.status = DeliveryStatus::DeadLetter;
            delivery.next_retry_at = None;
            tracing::warn!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                subscription_id = %delivery.subscription_id,
                event_id = %delivery.event_id,
                attempt,
                error = delivery.error_message.as_deref().unwrap_or_default(),
                "Delivery moved to dead letter queue"
            );
            self.deliveries.save(delivery)?;
            self.record_dead_letter(&sub.id)?;
            return Ok(DeliveryStatus::DeadLetter);
        }

        if self.subscriptions.get(&sub.id)?.is_none() {
            delivery.cancel(now);
            self.deliveries.save(delivery)?;
            return Ok(DeliveryStatus::Cancelled);
        }

        let backoff = self
            .settings
            .backoff
            .with_base_at_most(Duration::from_millis(sub.config.retry_delay_ms));
        let delay = backoff.delay(attempt);
        delivery.status = DeliveryStatus::Pending;
        let delay_td =
            chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        delivery.next_retry_at = Some(now + delay_td);
        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %delivery.subscription_id,
            attempt,
            max_attempts = sub.config.retry_attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = delivery.error_message.as_deref().unwrap_or_default(),
            "Delivery attempt failed, retry scheduled"
        );
        let id = delivery.id.clone();
        self.deliveries.save(delivery)?;
        self.deliveries.requeue(&id)?;
        Ok(DeliveryStatus::Pending)
    }

    fn mark_delivered(
        &self,
        mut delivery: WebhookDelivery,
        now: chrono::DateTime<chrono::Utc>,
    ) -> ApiResult<DeliveryStatus> {
        delivery.status = DeliveryStatus::Delivered;
        delivery.delivered_at = Some(now);
        delivery.next_retry_at = None;
        delivery.error = None;
        delivery.error_message = None;

        tracing::info!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %delivery.subscription_id,
            event_id = %delivery.event_id,
            event_type = %delivery.event_type,
            attempt = delivery.attempt_count,
            status = delivery.response_status.unwrap_or(0),
            "Webhook delivered"
        );

        self.subscriptions.modify(&delivery.subscription_id, &mut |sub| {
            sub.failure_count = 0;
            sub.last_delivered_at = Some(now);
        })?;
        self.deliveries.save(delivery)?;
        Ok(DeliveryStatus::Delivered)
    }

    fn record_dead_letter(&self, subscription_id: &str) -> ApiResult<()> {
        let threshold = self.settings.dead_letter_threshold;
        let mut tripped = false;
        let updated = self.subscriptions.modify(subscription_id, &mut |sub| {
            sub.failure_count += 1;
            if sub.active && sub.failure_count >= threshold {
                sub.active = false;
                tripped = true;
            }
        })?;

        if let Some(sub) = updated {
            if tripped {
                tracing::warn!(
                    target: "webhook_delivery",
                    subscription_id = %sub.id,
                    url = %sub.url,
                    failure_count = sub.failure_count,
                    "Subscription deactivated after repeated dead letters"
                );
            }
        }
        Ok(())
    }
}

/// One bounded HTTP attempt. A stalled request is dropped at the timeout.
async fn attempt(sender: Arc<dyn DeliverySender>, request: OutboundRequest) -> AttemptResult {
    let started = Instant::now();
    let limit = request.timeout;
    let result = match tokio::time::timeout(limit, sender.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(DeliveryErrorKind::Timeout {
            after_ms: limit.as_millis() as u64,
        }),
    };
    (result, started.elapsed())
}

fn truncate(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut cut = max;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
