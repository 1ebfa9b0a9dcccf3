use crate::config::HealthConfig;
use crate::error::ApiResult;
use crate::models::{
    DeliveryCounts, DeliveryListFilter, DeliveryStatus, EventType, EventTypeCount, HealthWarning,
    SubscriptionCounts, WebhookStatistics,
};
use crate::services::clock::Clock;
use crate::services::emitter::EventEmitter;
use crate::store::{DeliveryStore, SubscriptionStore};
use std::collections::HashMap;
use std::sync::Arc;

const TOP_EVENT_TYPES: usize = 5;

pub struct HealthMonitor {
    subscriptions: Arc<dyn SubscriptionStore>,
    deliveries: Arc<dyn DeliveryStore>,
    emitter: Arc<EventEmitter>,
    clock: Arc<dyn Clock>,
    config: HealthConfig,
    retention: Option<chrono::Duration>,
}

impl HealthMonitor {
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        deliveries: Arc<dyn DeliveryStore>,
        emitter: Arc<EventEmitter>,
        clock: Arc<dyn Clock>,
        config: HealthConfig,
    ) -> Self {
        Self {
            subscriptions,
            deliveries,
            emitter,
            clock,
            config,
            retention: None,
        }
    }

    /// Purge terminal deliveries older than `retention` on every health run.
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn statistics(&self) -> ApiResult<WebhookStatistics> {
        let subs = self.subscriptions.list()?;
        let active = subs.iter().filter(|s| s.active).count();
        let subscriptions = SubscriptionCounts {
            total: subs.len(),
            active,
            inactive: subs.len() - active,
        };

        let deliveries = self.deliveries.list(&DeliveryListFilter::default())?;
        let mut counts = DeliveryCounts {
            total: deliveries.len(),
            ..Default::default()
        };
        let mut durations = Vec::new();
        for d in &deliveries {
            match d.status {
                DeliveryStatus::Pending => counts.pending += 1,
                DeliveryStatus::Delivering => counts.delivering += 1,
                DeliveryStatus::Delivered => {
                    counts.delivered += 1;
                    if let Some(ms) = d.metrics.duration_ms {
                        durations.push(ms as f64);
                    }
                }
                DeliveryStatus::DeadLetter => counts.dead_letter += 1,
                DeliveryStatus::Cancelled => counts.cancelled += 1,
            }
        }

        let finished = counts.delivered + counts.dead_letter;
        let success_rate = if finished == 0 {
            100.0
        } else {
            counts.delivered as f64 / finished as f64 * 100.0
        };
        let average_delivery_ms = if durations.is_empty() {
            None
        } else {
            Some(durations.iter().sum::<f64>() / durations.len() as f64)
        };

        let since = self.clock.now() - chrono::Duration::hours(24);
        let (top_event_types, total_events, recent_events_24h) =
            self.emitter.with_history(|history| {
                let mut by_type: HashMap<EventType, usize> = HashMap::new();
                let mut recent = 0;
                for event in history {
                    *by_type.entry(event.event_type).or_default() += 1;
                    if event.timestamp >= since {
                        recent += 1;
                    }
                }
                let mut top: Vec<EventTypeCount> = by_type
                    .into_iter()
                    .map(|(event_type, count)| EventTypeCount { event_type, count })
                    .collect();
                top.sort_by(|a, b| b.count.cmp(&a.count).then(a.event_type.cmp(&b.event_type)));
                top.truncate(TOP_EVENT_TYPES);
                (top, history.len(), recent)
            });

        Ok(WebhookStatistics {
            subscriptions,
            dead_letter_queue_size: counts.dead_letter,
            deliveries: counts,
            success_rate,
            average_delivery_ms,
            top_event_types,
            total_events,
            recent_events_24h,
            retry_queue_size: self.deliveries.queue_len()?,
        })
    }

    /// Observability signals only; nothing is remediated here.
    pub fn warnings(&self, stats: &WebhookStatistics) -> Vec<HealthWarning> {
        let mut warnings = Vec::new();
        if stats.success_rate < self.config.min_success_rate
            && stats.deliveries.total > self.config.min_deliveries
        {
            warnings.push(HealthWarning::LowSuccessRate {
                success_rate: stats.success_rate,
                total_deliveries: stats.deliveries.total,
            });
        }
        if stats.retry_queue_size > self.config.max_retry_queue {
            warnings.push(HealthWarning::RetryQueueBacklog {
                size: stats.retry_queue_size,
            });
        }
        warnings
    }

    /// Periodic entry point: log a snapshot, raise warnings, apply retention.
    pub fn run_check(&self) -> ApiResult<Vec<HealthWarning>> {
        if let Some(retention) = self.retention {
            let purged = self
                .deliveries
                .purge_terminal_before(self.clock.now() - retention)?;
            if purged > 0 {
                tracing::info!(purged, "Purged finished deliveries past retention");
            }
        }

        let stats = self.statistics()?;
        tracing::info!(
            subscriptions = stats.subscriptions.total,
            active_subscriptions = stats.subscriptions.active,
            deliveries = stats.deliveries.total,
            success_rate = stats.success_rate,
            retry_queue = stats.retry_queue_size,
            dead_letter_queue = stats.dead_letter_queue_size,
            recent_events = stats.recent_events_24h,
            "Webhook system health"
        );

        let warnings = self.warnings(&stats);
        for warning in &warnings {
            match warning {
                HealthWarning::LowSuccessRate {
                    success_rate,
                    total_deliveries,
                } => tracing::warn!(
                    success_rate = *success_rate,
                    total_deliveries,
                    "Webhook success rate below threshold"
                ),
                HealthWarning::RetryQueueBacklog { size } => {
                    tracing::warn!(size, "Webhook retry queue backlog")
                }
            }
        }
        Ok(warnings)
    }
}
