//! The webhook event system as one owned value.
//!
//! [`WebhookEventSystem`] wires the registry, emitter, dispatcher and health
//! monitor over shared stores. Construct it once per process through
//! [`WebhookEventSystem::builder`] and pass it around behind an `Arc`.

use crate::config::Config;
use crate::error::{ApiResult, WebhookError};
use crate::models::{
    DeliveryListFilter, EventContext, EventType, HealthWarning, NewSubscription,
    SubscriptionListFilter, SubscriptionPatch, WebhookDelivery, WebhookEventPayload,
    WebhookStatistics, WebhookSubscription,
};
use crate::services::clock::{Clock, SystemClock};
use crate::services::dispatcher::{DeliveryDispatcher, TickReport};
use crate::services::emitter::{EmittedEvent, EventEmitter};
use crate::services::health::HealthMonitor;
use crate::services::metrics::{MetricsSink, TracingMetricsSink};
use crate::services::registry::SubscriptionRegistry;
use crate::services::scheduler::PeriodicTask;
use crate::services::sender::{DeliverySender, ReqwestSender};
use crate::store::{DeliveryStore, MemoryDeliveryStore, MemorySubscriptionStore, SubscriptionStore};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub struct SystemBuilder {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    sender: Option<Arc<dyn DeliverySender>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    subscriptions: Option<Arc<dyn SubscriptionStore>>,
    deliveries: Option<Arc<dyn DeliveryStore>>,
}

impl SystemBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn DeliverySender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(sink);
        self
    }

    pub fn with_subscription_store(mut self, store: Arc<dyn SubscriptionStore>) -> Self {
        self.subscriptions = Some(store);
        self
    }

    pub fn with_delivery_store(mut self, store: Arc<dyn DeliveryStore>) -> Self {
        self.deliveries = Some(store);
        self
    }

    pub fn build(self) -> ApiResult<WebhookEventSystem> {
        let config = self.config;
        config
            .validate()
            .map_err(|e| WebhookError::Validation(e.to_string()))?;
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let sender = match self.sender {
            Some(sender) => sender,
            None => Arc::new(ReqwestSender::new(
                &config.delivery.user_agent,
                config.delivery.max_response_body,
            )?),
        };
        let subscriptions = self
            .subscriptions
            .unwrap_or_else(|| Arc::new(MemorySubscriptionStore::new()));
        let deliveries = self
            .deliveries
            .unwrap_or_else(|| Arc::new(MemoryDeliveryStore::new()));

        let registry = Arc::new(SubscriptionRegistry::new(
            subscriptions.clone(),
            deliveries.clone(),
            clock.clone(),
            config.delivery.subscription_defaults(),
        ));
        let emitter = Arc::new(EventEmitter::new(
            registry.clone(),
            deliveries.clone(),
            clock.clone(),
            config.events.clone(),
        ));

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(TracingMetricsSink));
        let dispatcher = DeliveryDispatcher::new(
            subscriptions.clone(),
            deliveries.clone(),
            sender,
            clock.clone(),
            config.delivery.dispatcher_settings(),
        )
        .with_metrics(metrics);

        let mut health = HealthMonitor::new(
            subscriptions,
            deliveries.clone(),
            emitter.clone(),
            clock,
            config.health.clone(),
        );
        if config.delivery.retention_hours > 0 {
            health = health.with_retention(chrono::Duration::hours(
                config.delivery.retention_hours as i64,
            ));
        }

        Ok(WebhookEventSystem {
            config,
            registry,
            emitter,
            dispatcher: Arc::new(dispatcher),
            health: Arc::new(health),
            deliveries,
            tasks: Mutex::new(Vec::new()),
        })
    }
}

pub struct WebhookEventSystem {
    config: Config,
    registry: Arc<SubscriptionRegistry>,
    emitter: Arc<EventEmitter>,
    dispatcher: Arc<DeliveryDispatcher>,
    health: Arc<HealthMonitor>,
    deliveries: Arc<dyn DeliveryStore>,
    tasks: Mutex<Vec<PeriodicTask>>,
}

impl WebhookEventSystem {
    pub fn builder(config: Config) -> SystemBuilder {
        SystemBuilder {
            config,
            clock: None,
            sender: None,
            metrics: None,
            subscriptions: None,
            deliveries: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // Emission

    /// Emit a domain event. Returns its id whether or not anything matched.
    pub fn emit_event(
        &self,
        event_type: EventType,
        data: serde_json::Value,
        context: EventContext,
    ) -> String {
        self.emitter.emit(event_type, data, context).event_id
    }

    /// Like [`emit_event`](Self::emit_event), also reporting the deliveries created.
    pub fn emit(
        &self,
        event_type: EventType,
        data: serde_json::Value,
        context: EventContext,
    ) -> EmittedEvent {
        self.emitter.emit(event_type, data, context)
    }

    pub fn get_event(&self, id: &str) -> Option<WebhookEventPayload> {
        self.emitter.get_event(id)
    }

    pub fn recent_events(&self, limit: usize) -> Vec<WebhookEventPayload> {
        self.emitter.recent_events(limit)
    }

    // Subscription management

    pub fn register_subscription(
        &self,
        spec: NewSubscription,
    ) -> ApiResult<(WebhookSubscription, String)> {
        self.registry.register(spec)
    }

    pub fn update_subscription(&self, id: &str, patch: SubscriptionPatch) -> ApiResult<bool> {
        self.registry.update(id, patch)
    }

    pub fn remove_subscription(&self, id: &str) -> ApiResult<bool> {
        self.registry.remove(id)
    }

    pub fn get_subscription(&self, id: &str) -> ApiResult<Option<WebhookSubscription>> {
        self.registry.get(id)
    }

    pub fn list_subscriptions(
        &self,
        filter: &SubscriptionListFilter,
    ) -> ApiResult<Vec<WebhookSubscription>> {
        self.registry.list(filter)
    }

    /// Queue a `webhook.test` delivery for one subscription.
    pub fn test_subscription(&self, id: &str) -> ApiResult<Option<String>> {
        self.emitter.ping(id)
    }

    // Operational queries

    pub fn get_delivery(&self, id: &str) -> ApiResult<Option<WebhookDelivery>> {
        self.deliveries.get(id)
    }

    pub fn list_deliveries(&self, filter: &DeliveryListFilter) -> ApiResult<Vec<WebhookDelivery>> {
        self.deliveries.list(filter)
    }

    pub fn retry_delivery(&self, id: &str) -> ApiResult<bool> {
        self.dispatcher.retry_delivery(id)
    }

    pub fn get_statistics(&self) -> ApiResult<WebhookStatistics> {
        self.health.statistics()
    }

    pub fn health_warnings(&self, stats: &WebhookStatistics) -> Vec<HealthWarning> {
        self.health.warnings(stats)
    }

    // Scheduling

    /// Run one dispatcher tick now.
    pub async fn dispatch_once(&self) -> TickReport {
        self.dispatcher.tick().await
    }

    pub fn run_health_check(&self) -> ApiResult<Vec<HealthWarning>> {
        self.health.run_check()
    }

    /// Start the dispatcher and health loops. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            return;
        }

        let dispatcher = self.dispatcher.clone();
        tasks.push(PeriodicTask::spawn(
            "webhook-dispatcher",
            self.config.delivery.tick_interval(),
            move || {
                let dispatcher = dispatcher.clone();
                async move {
                    let report = dispatcher.tick().await;
                    if report.attempted > 0 || report.cancelled > 0 {
                        tracing::debug!(
                            attempted = report.attempted,
                            delivered = report.delivered,
                            retried = report.retried,
                            dead_lettered = report.dead_lettered,
                            cancelled = report.cancelled,
                            "Dispatcher tick finished"
                        );
                    }
                }
            },
        ));

        let health = self.health.clone();
        tasks.push(PeriodicTask::spawn(
            "webhook-health",
            Duration::from_secs(self.config.health.interval_secs),
            move || {
                let health = health.clone();
                async move {
                    if let Err(e) = health.run_check() {
                        tracing::error!(error = %e, "Webhook health check failed");
                    }
                }
            },
        ));

        tracing::info!(
            tick_interval_secs = self.config.delivery.tick_interval_secs,
            health_interval_secs = self.config.health.interval_secs,
            "Webhook event system started"
        );
    }

    pub fn is_started(&self) -> bool {
        !self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Stop both loops, letting a tick in progress finish.
    pub async fn stop(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task.stop().await;
        }
        tracing::info!("Webhook event system stopped");
    }
}
