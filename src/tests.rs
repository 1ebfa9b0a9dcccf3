#[cfg(test)]
mod tests {
    use crate::error::DeliveryErrorKind;
    use crate::models::{DeliveryConfigPatch, EventType, NewSubscription, WebhookSubscription};
    use crate::services::clock::ManualClock;
    use crate::services::metrics::{MetricsSink, RequestSample};
    use crate::services::sender::{DeliverySender, OutboundRequest, SendResponse};
    use crate::store::{MemoryDeliveryStore, MemorySubscriptionStore};
    use crate::{Config, WebhookEventSystem};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    type Outcome = Result<SendResponse, DeliveryErrorKind>;

    /// Sender that replays scripted outcomes, then repeats a fallback.
    struct ScriptedSender {
        script: Mutex<VecDeque<Outcome>>,
        fallback: Outcome,
        delay: Duration,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl ScriptedSender {
        fn status(code: u16) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Ok(SendResponse {
                    status: code,
                    body: "ok".to_string(),
                }),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn ok() -> Self {
            Self::status(200)
        }

        fn with_body(mut self, body: &str) -> Self {
            if let Ok(ref mut resp) = self.fallback {
                resp.body = body.to_string();
            }
            self
        }

        fn then_status(self, code: u16) -> Self {
            self.script.lock().unwrap().push_back(Ok(SendResponse {
                status: code,
                body: String::new(),
            }));
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn respond_next(&self, code: u16, times: usize) {
            let mut script = self.script.lock().unwrap();
            script.clear();
            for _ in 0..times {
                script.push_back(Ok(SendResponse {
                    status: code,
                    body: String::new(),
                }));
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DeliverySender for ScriptedSender {
        async fn send(&self, request: OutboundRequest) -> Outcome {
            self.requests.lock().unwrap().push(request);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        samples: Mutex<Vec<(String, RequestSample)>>,
    }

    impl MetricsSink for RecordingSink {
        fn record(&self, delivery_id: &str, sample: RequestSample) {
            self.samples
                .lock()
                .unwrap()
                .push((delivery_id.to_string(), sample));
        }
    }

    struct Harness {
        system: Arc<WebhookEventSystem>,
        clock: Arc<ManualClock>,
        subs: Arc<MemorySubscriptionStore>,
        deliveries: Arc<MemoryDeliveryStore>,
        sender: Arc<ScriptedSender>,
    }

    fn start_time() -> chrono::DateTime<chrono::Utc> {
        chrono::Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn harness_with(config: Config, sender: ScriptedSender) -> Harness {
        let clock = Arc::new(ManualClock::new(start_time()));
        let subs = Arc::new(MemorySubscriptionStore::new());
        let deliveries = Arc::new(MemoryDeliveryStore::new());
        let sender = Arc::new(sender);
        let system = WebhookEventSystem::builder(config)
            .with_clock(clock.clone())
            .with_sender(sender.clone())
            .with_subscription_store(subs.clone())
            .with_delivery_store(deliveries.clone())
            .build()
            .expect("Failed to build system");
        Harness {
            system: Arc::new(system),
            clock,
            subs,
            deliveries,
            sender,
        }
    }

    fn harness(sender: ScriptedSender) -> Harness {
        harness_with(Config::default(), sender)
    }

    fn subscribe(
        h: &Harness,
        events: Vec<EventType>,
        config: DeliveryConfigPatch,
    ) -> (WebhookSubscription, String) {
        h.system
            .register_subscription(
                NewSubscription::new("https://example.com/hooks", events).with_config(config),
            )
            .expect("Failed to register subscription")
    }

    fn retries(n: u32) -> DeliveryConfigPatch {
        DeliveryConfigPatch {
            retry_attempts: Some(n),
            ..Default::default()
        }
    }

    fn ctx() -> crate::models::EventContext {
        crate::models::EventContext::new("tests")
    }

    mod signature_tests {
        use crate::services::signature::{generate_secret, sign, signature_header_value, verify};

        #[test]
        fn test_sign_known_vector() {
            assert_eq!(
                sign(b"The quick brown fox jumps over the lazy dog", "key"),
                "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
            );
        }

        #[test]
        fn test_verify_round_trip() {
            let body = br#"{"id":"evt_1","type":"booking.created"}"#;
            let sig = sign(body, "whsec_test");
            assert!(verify(body, &sig, "whsec_test"));
            assert!(verify(body, &signature_header_value(body, "whsec_test"), "whsec_test"));
        }

        #[test]
        fn test_verify_rejects_single_byte_change() {
            let body = br#"{"amount":100}"#.to_vec();
            let sig = sign(&body, "secret");
            for i in 0..body.len() {
                let mut tampered = body.clone();
                tampered[i] ^= 0x01;
                assert!(!verify(&tampered, &sig, "secret"), "byte {} accepted", i);
            }
        }

        #[test]
        fn test_verify_rejects_wrong_secret_and_garbage() {
            let body = b"payload";
            let sig = sign(body, "secret");
            assert!(!verify(body, &sig, "other"));
            assert!(!verify(body, "sha256=abc", "secret"));
            assert!(!verify(body, "", "secret"));
        }

        #[test]
        fn test_generate_secret_format() {
            let a = generate_secret();
            let b = generate_secret();
            assert!(a.starts_with("whsec_"));
            assert_eq!(a.len(), "whsec_".len() + 43);
            assert_ne!(a, b);
        }
    }

    mod backoff_tests {
        use crate::services::backoff::{BackoffPolicy, MAX_JITTER};
        use std::time::Duration;

        fn policy() -> BackoffPolicy {
            BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(300))
        }

        #[test]
        fn test_delay_doubles_per_attempt() {
            let p = policy();
            assert_eq!(p.delay_with_jitter(1, 0.0), Duration::from_secs(1));
            assert_eq!(p.delay_with_jitter(2, 0.0), Duration::from_secs(2));
            assert_eq!(p.delay_with_jitter(3, 0.0), Duration::from_secs(4));
        }

        #[test]
        fn test_delay_is_capped() {
            let p = policy();
            assert_eq!(p.delay_with_jitter(10, 0.0), Duration::from_secs(300));
            assert_eq!(p.delay_with_jitter(u32::MAX, 0.05), Duration::from_secs(300));
        }

        #[test]
        fn test_delay_non_decreasing() {
            let p = policy();
            let mut last = Duration::ZERO;
            for attempt in 1..=20 {
                let d = p.delay_with_jitter(attempt, 0.0);
                assert!(d >= last);
                last = d;
            }
        }

        #[test]
        fn test_random_jitter_within_bounds() {
            let p = policy();
            for attempt in 1..=6u32 {
                let floor = Duration::from_secs(1 << (attempt - 1));
                let ceiling = floor.mul_f64(1.0 + MAX_JITTER);
                for _ in 0..50 {
                    let d = p.delay(attempt);
                    assert!(d >= floor && d <= ceiling, "{:?} outside bounds", d);
                }
            }
        }

        #[test]
        fn test_jitter_is_clamped() {
            let p = policy();
            assert_eq!(p.delay_with_jitter(1, -1.0), Duration::from_secs(1));
            assert_eq!(p.delay_with_jitter(1, f64::NAN), Duration::from_secs(1));
            assert!(
                p.delay_with_jitter(1, 5.0) <= Duration::from_secs(1).mul_f64(1.0 + MAX_JITTER)
            );
        }

        #[test]
        fn test_with_base_at_most() {
            let p = policy();
            assert_eq!(
                p.with_base_at_most(Duration::from_millis(200)).base,
                Duration::from_millis(200)
            );
            assert_eq!(p.with_base_at_most(Duration::from_secs(60)).base, Duration::from_secs(1));
        }
    }

    mod model_tests {
        use crate::models::{
            DeliveryStatus, EventContext, EventMetadata, EventType, WebhookEventPayload,
        };

        fn payload(data: serde_json::Value) -> WebhookEventPayload {
            WebhookEventPayload {
                id: "evt_1".to_string(),
                event_type: EventType::BookingCreated,
                version: "1.0".to_string(),
                timestamp: chrono::Utc::now(),
                data,
                metadata: EventMetadata {
                    source: "tests".to_string(),
                    resource_id: Some("bk_1".to_string()),
                    user_id: None,
                    session_id: None,
                    correlation_id: None,
                    environment: "test".to_string(),
                },
            }
        }

        #[test]
        fn test_event_type_names() {
            for t in EventType::ALL {
                assert_eq!(t.as_str().parse::<EventType>().unwrap(), t);
                assert_eq!(serde_json::to_value(t).unwrap(), t.as_str());
            }
            assert!("booking.exploded".parse::<EventType>().is_err());
        }

        #[test]
        fn test_payload_wire_format() {
            let json = serde_json::to_value(payload(serde_json::json!({"a": 1}))).unwrap();
            assert_eq!(json["type"], "booking.created");
            assert_eq!(json["metadata"]["resourceId"], "bk_1");
            assert_eq!(json["metadata"]["environment"], "test");
            assert!(json["metadata"].get("userId").is_none());
        }

        #[test]
        fn test_data_at_paths() {
            let p = payload(serde_json::json!({
                "booking": {"guests": [{"name": "Ada"}], "total": 120}
            }));
            assert_eq!(p.data_at("booking.total"), Some(&serde_json::json!(120)));
            assert_eq!(p.data_at("booking.guests.0.name"), Some(&serde_json::json!("Ada")));
            assert_eq!(p.data_at("booking.missing"), None);
            assert_eq!(p.data_at("booking.total.value"), None);
        }

        #[test]
        fn test_event_context_builders() {
            let c = EventContext::new("api")
                .with_resource("r1")
                .with_user("u1")
                .with_correlation("c1");
            assert_eq!(c.source, "api");
            assert_eq!(c.resource_id.as_deref(), Some("r1"));
            assert_eq!(c.user_id.as_deref(), Some("u1"));
            assert_eq!(c.correlation_id.as_deref(), Some("c1"));
        }

        #[test]
        fn test_delivery_status_strings() {
            assert_eq!(
                "dead_letter".parse::<DeliveryStatus>().unwrap(),
                DeliveryStatus::DeadLetter
            );
            assert_eq!(DeliveryStatus::Cancelled.to_string(), "CANCELLED");
            assert!(DeliveryStatus::Delivered.is_terminal());
            assert!(!DeliveryStatus::Pending.is_terminal());
        }
    }

    mod registry_tests {
        use super::*;
        use crate::error::WebhookError;
        use crate::models::{
            SubscriptionFilters, SubscriptionListFilter, SubscriptionMetadata, SubscriptionPatch,
        };
        use crate::store::SubscriptionStore;

        #[test]
        fn test_register_defaults() {
            let h = harness(ScriptedSender::ok());
            let (sub, secret) = subscribe(&h, vec![EventType::BookingCreated], Default::default());

            assert!(sub.id.starts_with("sub_"));
            assert!(sub.active);
            assert_eq!(sub.failure_count, 0);
            assert_eq!(sub.secret, secret);
            assert_eq!(sub.config.retry_attempts, 3);
            assert_eq!(sub.config.timeout_ms, 10_000);
            assert_eq!(sub.config.signature_header, "X-Webhook-Signature");
            assert_eq!(sub.created_at, start_time());

            let json = serde_json::to_value(&sub).unwrap();
            assert!(json.get("secret").is_none());
        }

        #[test]
        fn test_register_merges_config() {
            let h = harness(ScriptedSender::ok());
            let patch = DeliveryConfigPatch {
                timeout_ms: Some(2_000),
                retry_attempts: Some(7),
                ..Default::default()
            };
            let (sub, _) = subscribe(&h, vec![EventType::PaymentFailed], patch);
            assert_eq!(sub.config.timeout_ms, 2_000);
            assert_eq!(sub.config.retry_attempts, 7);
            assert_eq!(sub.config.retry_delay_ms, 1_000);
        }

        #[test]
        fn test_register_rejects_bad_input() {
            let h = harness(ScriptedSender::ok());
            for url in ["not a url", "ftp://example.com/x", "mailto:ops@example.com"] {
                let err = h
                    .system
                    .register_subscription(NewSubscription::new(url, vec![EventType::QuoteSent]))
                    .unwrap_err();
                assert!(matches!(err, WebhookError::InvalidUrl(_)), "{} accepted", url);
            }

            let err = h
                .system
                .register_subscription(NewSubscription::new("https://example.com", vec![]))
                .unwrap_err();
            assert!(matches!(err, WebhookError::Validation(_)));

            let err = h
                .system
                .register_subscription(
                    NewSubscription::new("https://example.com", vec![EventType::QuoteSent])
                        .with_config(retries(0)),
                )
                .unwrap_err();
            assert!(matches!(err, WebhookError::Validation(_)));
        }

        #[test]
        fn test_register_rejects_unusable_headers() {
            let h = harness(ScriptedSender::ok());
            let with_headers = |pairs: &[(&str, &str)]| DeliveryConfigPatch {
                headers: Some(
                    pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            };

            let rejected = [
                with_headers(&[("bad header", "x")]),
                with_headers(&[("X-Tenant", "line\nbreak")]),
                with_headers(&[("content-type", "text/plain")]),
                with_headers(&[("X-WEBHOOK-EVENT", "spoof")]),
                with_headers(&[("x-webhook-delivery", "dlv_fake")]),
                with_headers(&[("x-webhook-signature", "sha256=00")]),
                DeliveryConfigPatch {
                    signature_header: Some("X Signature".to_string()),
                    ..Default::default()
                },
                DeliveryConfigPatch {
                    signature_header: Some("content-type".to_string()),
                    ..Default::default()
                },
            ];
            for config in rejected {
                let err = h
                    .system
                    .register_subscription(
                        NewSubscription::new("https://example.com", vec![EventType::QuoteSent])
                            .with_config(config.clone()),
                    )
                    .unwrap_err();
                assert!(matches!(err, WebhookError::Validation(_)), "{:?} accepted", config);
            }

            let (sub, _) = subscribe(
                &h,
                vec![EventType::QuoteSent],
                with_headers(&[("X-Tenant", "acme")]),
            );
            let err = h
                .system
                .update_subscription(
                    &sub.id,
                    SubscriptionPatch {
                        config: Some(with_headers(&[("Bad Header", "x")])),
                        ..Default::default()
                    },
                )
                .unwrap_err();
            assert!(matches!(err, WebhookError::Validation(_)));
            let stored = h.system.get_subscription(&sub.id).unwrap().unwrap();
            assert_eq!(stored.config.headers.get("X-Tenant").map(String::as_str), Some("acme"));
        }

        #[test]
        fn test_update_and_reactivate_resets_failures() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.subs
                .modify(&sub.id, &mut |s| {
                    s.active = false;
                    s.failure_count = 5;
                })
                .unwrap();

            let updated = h
                .system
                .update_subscription(
                    &sub.id,
                    SubscriptionPatch {
                        active: Some(true),
                        url: Some("https://example.org/new".to_string()),
                        ..Default::default()
                    },
                )
                .unwrap();
            assert!(updated);

            let sub = h.system.get_subscription(&sub.id).unwrap().unwrap();
            assert!(sub.active);
            assert_eq!(sub.failure_count, 0);
            assert_eq!(sub.url, "https://example.org/new");
        }

        #[test]
        fn test_update_validates_and_reports_unknown() {
            let h = harness(ScriptedSender::ok());
            assert!(!h
                .system
                .update_subscription("sub_missing", SubscriptionPatch::default())
                .unwrap());

            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let err = h
                .system
                .update_subscription(
                    &sub.id,
                    SubscriptionPatch {
                        url: Some("gopher://old".to_string()),
                        ..Default::default()
                    },
                )
                .unwrap_err();
            assert!(matches!(err, WebhookError::InvalidUrl(_)));
            assert_eq!(
                h.system.get_subscription(&sub.id).unwrap().unwrap().url,
                "https://example.com/hooks"
            );
        }

        #[test]
        fn test_remove_unknown_is_false() {
            let h = harness(ScriptedSender::ok());
            assert!(!h.system.remove_subscription("sub_missing").unwrap());
        }

        #[test]
        fn test_list_filters() {
            let h = harness(ScriptedSender::ok());
            let (a, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system
                .register_subscription(
                    NewSubscription::new(
                        "https://crm.example.com",
                        vec![EventType::CustomerCreated],
                    )
                    .with_metadata(SubscriptionMetadata {
                        provider: Some("crm".to_string()),
                        ..Default::default()
                    }),
                )
                .unwrap();
            h.system
                .update_subscription(
                    &a.id,
                    SubscriptionPatch {
                        active: Some(false),
                        ..Default::default()
                    },
                )
                .unwrap();

            let all = h.system.list_subscriptions(&SubscriptionListFilter::default()).unwrap();
            assert_eq!(all.len(), 2);

            let active = h
                .system
                .list_subscriptions(&SubscriptionListFilter {
                    active: Some(true),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].metadata.provider.as_deref(), Some("crm"));

            let booking = h
                .system
                .list_subscriptions(&SubscriptionListFilter {
                    events: Some(vec![EventType::BookingCreated, EventType::QuoteSent]),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(booking.len(), 1);
            assert_eq!(booking[0].id, a.id);
        }

        #[test]
        fn test_resource_filter_routes_events() {
            let h = harness(ScriptedSender::ok());
            h.system
                .register_subscription(
                    NewSubscription::new("https://example.com", vec![EventType::BookingCreated])
                        .with_filters(SubscriptionFilters {
                            resource_ids: Some(vec!["A".to_string()]),
                            ..Default::default()
                        }),
                )
                .unwrap();

            let miss = h.system.emit(
                EventType::BookingCreated,
                serde_json::json!({}),
                ctx().with_resource("B"),
            );
            assert!(miss.delivery_ids.is_empty());

            let hit = h.system.emit(
                EventType::BookingCreated,
                serde_json::json!({}),
                ctx().with_resource("A"),
            );
            assert_eq!(hit.delivery_ids.len(), 1);

            let unscoped = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert_eq!(unscoped.delivery_ids.len(), 1);
        }

        #[test]
        fn test_empty_allow_list_rejects_carrying_events() {
            let h = harness(ScriptedSender::ok());
            h.system
                .register_subscription(
                    NewSubscription::new("https://example.com", vec![EventType::BookingCreated])
                        .with_filters(SubscriptionFilters {
                            user_ids: Some(vec![]),
                            ..Default::default()
                        }),
                )
                .unwrap();

            let with_user = h.system.emit(
                EventType::BookingCreated,
                serde_json::json!({}),
                ctx().with_user("u1"),
            );
            assert!(with_user.delivery_ids.is_empty());
            let without = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert_eq!(without.delivery_ids.len(), 1);
        }

        #[test]
        fn test_condition_filters() {
            let h = harness(ScriptedSender::ok());
            let mut conditions = std::collections::BTreeMap::new();
            conditions.insert("payment.currency".to_string(), serde_json::json!("EUR"));
            h.system
                .register_subscription(
                    NewSubscription::new("https://example.com", vec![EventType::PaymentCompleted])
                        .with_filters(SubscriptionFilters {
                            conditions,
                            ..Default::default()
                        }),
                )
                .unwrap();

            let usd = h.system.emit(
                EventType::PaymentCompleted,
                serde_json::json!({"payment": {"currency": "USD"}}),
                ctx(),
            );
            assert!(usd.delivery_ids.is_empty());

            let eur = h.system.emit(
                EventType::PaymentCompleted,
                serde_json::json!({"payment": {"currency": "EUR"}}),
                ctx(),
            );
            assert_eq!(eur.delivery_ids.len(), 1);
        }
    }

    mod emitter_tests {
        use super::*;
        use crate::models::{DeliveryStatus, SubscriptionPatch};
        use crate::services::emitter::{HEADER_DELIVERY, HEADER_EVENT};
        use crate::services::signature;
        use crate::store::DeliveryStore;

        #[test]
        fn test_emit_without_subscribers() {
            let h = harness(ScriptedSender::ok());
            let emitted =
                h.system
                    .emit(EventType::QuoteRequested, serde_json::json!({"q": 1}), ctx());
            assert!(emitted.event_id.starts_with("evt_"));
            assert!(emitted.delivery_ids.is_empty());

            let event = h.system.get_event(&emitted.event_id).unwrap();
            assert_eq!(event.event_type, EventType::QuoteRequested);
            assert_eq!(event.timestamp, start_time());
            assert_eq!(event.metadata.environment, "development");
            assert_eq!(event.version, "1.0");
            assert_eq!(h.deliveries.queue_len().unwrap(), 0);
        }

        #[test]
        fn test_emit_skips_inactive_and_unsubscribed() {
            let h = harness(ScriptedSender::ok());
            let (inactive, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            subscribe(&h, vec![EventType::PaymentFailed], Default::default());
            h.system
                .update_subscription(
                    &inactive.id,
                    SubscriptionPatch {
                        active: Some(false),
                        ..Default::default()
                    },
                )
                .unwrap();

            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert!(emitted.delivery_ids.is_empty());
        }

        #[test]
        fn test_delivery_headers_and_signature() {
            let h = harness(ScriptedSender::ok());
            let mut headers = std::collections::BTreeMap::new();
            headers.insert("X-Tenant".to_string(), "acme".to_string());
            let (sub, secret) = subscribe(
                &h,
                vec![EventType::BookingConfirmed],
                DeliveryConfigPatch {
                    headers: Some(headers),
                    signature_header: Some("X-Signature".to_string()),
                    ..Default::default()
                },
            );

            let emitted = h.system.emit(
                EventType::BookingConfirmed,
                serde_json::json!({"bookingId": "bk_9"}),
                ctx().with_resource("bk_9"),
            );
            let delivery = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();

            assert_eq!(delivery.status, DeliveryStatus::Pending);
            assert_eq!(delivery.attempt_count, 0);
            assert_eq!(delivery.subscription_id, sub.id);
            assert_eq!(delivery.event_id, emitted.event_id);
            assert_eq!(delivery.metrics.request_size, delivery.body.len());

            let h_ = &delivery.request_headers;
            assert_eq!(h_["Content-Type"], "application/json");
            assert_eq!(h_["X-Tenant"], "acme");
            assert_eq!(h_[HEADER_EVENT], "booking.confirmed");
            assert_eq!(h_[HEADER_DELIVERY], delivery.id);
            assert!(signature::verify(delivery.body.as_bytes(), &h_["X-Signature"], &secret));

            let body: serde_json::Value = serde_json::from_str(&delivery.body).unwrap();
            assert_eq!(body["id"], emitted.event_id);
            assert_eq!(body["data"]["bookingId"], "bk_9");
        }

        #[test]
        fn test_stored_headers_cannot_shadow_reserved() {
            use crate::store::SubscriptionStore;

            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.subs
                .modify(&sub.id, &mut |sub| {
                    for (name, value) in [
                        ("content-type", "text/plain"),
                        ("x-webhook-event", "spoof"),
                        ("X-WEBHOOK-SIGNATURE", "sha256=00"),
                        ("X-Tenant", "acme"),
                    ] {
                        sub.config.headers.insert(name.to_string(), value.to_string());
                    }
                })
                .unwrap();

            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            let delivery = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();
            let headers = &delivery.request_headers;

            assert_eq!(headers.len(), 5);
            assert_eq!(headers["Content-Type"], "application/json");
            assert_eq!(headers[HEADER_EVENT], "booking.created");
            assert_eq!(headers["X-Tenant"], "acme");
            assert!(headers["X-Webhook-Signature"].starts_with("sha256="));
            assert!(!headers.contains_key("content-type"));
            assert!(!headers.contains_key("x-webhook-event"));
        }

        #[test]
        fn test_history_is_bounded() {
            let mut config = Config::default();
            config.events.history_limit = 100;
            let h = harness_with(config, ScriptedSender::ok());

            let first = h.system.emit(EventType::CustomerCreated, serde_json::json!({}), ctx());
            let mut last = first.clone();
            for _ in 0..100 {
                last = h.system.emit(EventType::CustomerCreated, serde_json::json!({}), ctx());
            }

            let recent = h.system.recent_events(1000);
            assert_eq!(recent.len(), 91);
            assert_eq!(recent[0].id, last.event_id);
            assert!(h.system.get_event(&first.event_id).is_none());
        }

        #[test]
        fn test_recent_events_newest_first() {
            let h = harness(ScriptedSender::ok());
            let a = h.system.emit(EventType::QuoteSent, serde_json::json!({}), ctx());
            let b = h.system.emit(EventType::QuoteAccepted, serde_json::json!({}), ctx());
            let recent = h.system.recent_events(10);
            assert_eq!(recent[0].id, b.event_id);
            assert_eq!(recent[1].id, a.event_id);
            assert_eq!(h.system.recent_events(1).len(), 1);
        }

        #[test]
        fn test_ping_bypasses_event_set() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());

            let id = h.system.test_subscription(&sub.id).unwrap().unwrap();
            let delivery = h.system.get_delivery(&id).unwrap().unwrap();
            assert_eq!(delivery.event_type, EventType::WebhookTest);
            assert_eq!(delivery.payload.data["subscriptionId"], sub.id);

            assert!(h.system.test_subscription("sub_missing").unwrap().is_none());
        }
    }

    mod dispatcher_tests {
        use super::*;
        use crate::models::{DeliveryListFilter, DeliveryStatus, SubscriptionPatch};
        use crate::store::{DeliveryStore, SubscriptionStore};

        #[tokio::test]
        async fn test_successful_delivery() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());

            let report = h.system.dispatch_once().await;
            assert_eq!(report.attempted, 1);
            assert_eq!(report.delivered, 1);

            let d = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Delivered);
            assert_eq!(d.attempt_count, 1);
            assert_eq!(d.response_status, Some(200));
            assert_eq!(d.delivered_at, Some(start_time()));
            assert!(d.error.is_none());

            let sub = h.system.get_subscription(&sub.id).unwrap().unwrap();
            assert_eq!(sub.last_delivered_at, Some(start_time()));
            assert_eq!(h.deliveries.queue_len().unwrap(), 0);
        }

        #[tokio::test]
        async fn test_dead_letter_after_retry_attempts() {
            let h = harness(ScriptedSender::status(500));
            let (sub, _) = subscribe(&h, vec![EventType::PaymentFailed], retries(2));
            let emitted = h.system.emit(EventType::PaymentFailed, serde_json::json!({}), ctx());
            let id = &emitted.delivery_ids[0];

            let report = h.system.dispatch_once().await;
            assert_eq!(report.retried, 1);
            let d = h.system.get_delivery(id).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Pending);
            assert_eq!(d.attempt_count, 1);
            assert_eq!(d.error, Some(DeliveryErrorKind::HttpStatus { code: 500 }));
            let next = d.next_retry_at.unwrap();
            assert!(next >= start_time() + chrono::Duration::seconds(1));
            assert!(next <= start_time() + chrono::Duration::milliseconds(1100));

            // Not due yet.
            let report = h.system.dispatch_once().await;
            assert_eq!(report.attempted, 0);

            h.clock.advance(chrono::Duration::seconds(2));
            let report = h.system.dispatch_once().await;
            assert_eq!(report.dead_lettered, 1);

            let d = h.system.get_delivery(id).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::DeadLetter);
            assert_eq!(d.attempt_count, 2);
            assert!(d.next_retry_at.is_none());
            assert_eq!(h.sender.calls(), 2);

            let sub = h.system.get_subscription(&sub.id).unwrap().unwrap();
            assert_eq!(sub.failure_count, 1);
            assert!(sub.active);
            assert_eq!(h.deliveries.queue_len().unwrap(), 0);
        }

        #[tokio::test]
        async fn test_retry_then_success() {
            let h = harness(ScriptedSender::ok().then_status(503));
            subscribe(&h, vec![EventType::QuoteSent], Default::default());
            let emitted = h.system.emit(EventType::QuoteSent, serde_json::json!({}), ctx());

            assert_eq!(h.system.dispatch_once().await.retried, 1);
            h.clock.advance(chrono::Duration::seconds(5));
            assert_eq!(h.system.dispatch_once().await.delivered, 1);

            let d = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Delivered);
            assert_eq!(d.attempt_count, 2);
        }

        #[tokio::test]
        async fn test_success_resets_failure_count() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.subs.modify(&sub.id, &mut |s| s.failure_count = 3).unwrap();

            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;

            assert_eq!(h.system.get_subscription(&sub.id).unwrap().unwrap().failure_count, 0);
        }

        #[tokio::test]
        async fn test_circuit_breaker_deactivates_subscription() {
            let h = harness(ScriptedSender::status(500));
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], retries(1));

            for _ in 0..4 {
                h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            }
            assert_eq!(h.system.dispatch_once().await.dead_lettered, 4);
            let current = h.system.get_subscription(&sub.id).unwrap().unwrap();
            assert!(current.active);
            assert_eq!(current.failure_count, 4);

            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert_eq!(h.system.dispatch_once().await.dead_lettered, 1);
            let current = h.system.get_subscription(&sub.id).unwrap().unwrap();
            assert!(!current.active);
            assert_eq!(current.failure_count, 5);

            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert!(emitted.delivery_ids.is_empty());
        }

        #[tokio::test]
        async fn test_missing_subscription_cancels() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());

            // Bypass the registry so the queue still holds the delivery.
            h.subs.remove(&sub.id).unwrap();

            let report = h.system.dispatch_once().await;
            assert_eq!(report.cancelled, 1);
            assert_eq!(report.attempted, 0);
            let d = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Cancelled);
            assert_eq!(d.error, Some(DeliveryErrorKind::SubscriptionMissing));
            assert_eq!(h.sender.calls(), 0);
        }

        #[tokio::test]
        async fn test_remove_cancels_queued_deliveries() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let (other, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert_eq!(h.deliveries.queue_len().unwrap(), 4);

            assert!(h.system.remove_subscription(&sub.id).unwrap());
            assert_eq!(h.deliveries.queue_len().unwrap(), 2);

            let cancelled = h
                .system
                .list_deliveries(&DeliveryListFilter {
                    status: Some(DeliveryStatus::Cancelled),
                    ..Default::default()
                })
                .unwrap();
            assert_eq!(cancelled.len(), 2);
            assert!(cancelled.iter().all(|d| d.subscription_id == sub.id));

            let report = h.system.dispatch_once().await;
            assert_eq!(report.delivered, 2);
            assert_eq!(h.sender.calls(), 2);
            let delivered = h
                .system
                .list_deliveries(&DeliveryListFilter {
                    status: Some(DeliveryStatus::Delivered),
                    ..Default::default()
                })
                .unwrap();
            assert!(delivered.iter().all(|d| d.subscription_id == other.id));
        }

        #[tokio::test]
        async fn test_inactive_subscription_defers() {
            let h = harness(ScriptedSender::ok());
            let (sub, _) = subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system
                .update_subscription(
                    &sub.id,
                    SubscriptionPatch {
                        active: Some(false),
                        ..Default::default()
                    },
                )
                .unwrap();

            let report = h.system.dispatch_once().await;
            assert_eq!(report.deferred, 1);
            assert_eq!(report.attempted, 0);
            assert_eq!(h.deliveries.queue_len().unwrap(), 1);

            h.system
                .update_subscription(
                    &sub.id,
                    SubscriptionPatch {
                        active: Some(true),
                        ..Default::default()
                    },
                )
                .unwrap();
            assert_eq!(h.system.dispatch_once().await.delivered, 1);
        }

        #[tokio::test]
        async fn test_manual_retry_of_dead_letter() {
            let h = harness(ScriptedSender::status(500));
            subscribe(&h, vec![EventType::PaymentRefunded], retries(1));
            let emitted = h.system.emit(EventType::PaymentRefunded, serde_json::json!({}), ctx());
            let id = &emitted.delivery_ids[0];
            assert_eq!(h.system.dispatch_once().await.dead_lettered, 1);

            assert!(h.system.retry_delivery(id).unwrap());
            let d = h.system.get_delivery(id).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Pending);
            assert_eq!(d.attempt_count, 0);
            assert!(d.error.is_none());

            h.sender.respond_next(200, 1);
            assert_eq!(h.system.dispatch_once().await.delivered, 1);
            let d = h.system.get_delivery(id).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Delivered);
            assert_eq!(d.attempt_count, 1);

            assert!(!h.system.retry_delivery(id).unwrap());
            assert!(!h.system.retry_delivery("dlv_missing").unwrap());
        }

        #[tokio::test]
        async fn test_tick_is_not_reentrant() {
            let h = harness(ScriptedSender::ok().with_delay(Duration::from_millis(300)));
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());

            let system = h.system.clone();
            let first = tokio::spawn(async move { system.dispatch_once().await });
            tokio::time::sleep(Duration::from_millis(50)).await;

            let second = h.system.dispatch_once().await;
            assert!(second.skipped);
            assert_eq!(second.attempted, 0);

            let first = first.await.unwrap();
            assert!(!first.skipped);
            assert_eq!(first.delivered, 1);
            assert_eq!(h.sender.calls(), 1);
        }

        #[tokio::test]
        async fn test_manual_retry_ignores_in_flight_delivery() {
            let h = harness(ScriptedSender::ok().with_delay(Duration::from_millis(300)));
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            let id = emitted.delivery_ids[0].clone();

            let system = h.system.clone();
            let tick = tokio::spawn(async move { system.dispatch_once().await });
            tokio::time::sleep(Duration::from_millis(50)).await;

            assert!(!h.system.retry_delivery(&id).unwrap());
            assert_eq!(tick.await.unwrap().delivered, 1);

            let d = h.system.get_delivery(&id).unwrap().unwrap();
            assert_eq!(d.status, DeliveryStatus::Delivered);
            assert_eq!(d.attempt_count, 1);
            assert_eq!(h.deliveries.queue_len().unwrap(), 0);
        }

        #[tokio::test]
        async fn test_stalled_request_times_out() {
            let h = harness(ScriptedSender::ok().with_delay(Duration::from_millis(500)));
            subscribe(
                &h,
                vec![EventType::AvailabilityUpdated],
                DeliveryConfigPatch {
                    timeout_ms: Some(50),
                    ..Default::default()
                },
            );
            let emitted =
                h.system
                    .emit(EventType::AvailabilityUpdated, serde_json::json!({}), ctx());

            let report = h.system.dispatch_once().await;
            assert_eq!(report.retried, 1);
            let d = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();
            assert_eq!(d.error, Some(DeliveryErrorKind::Timeout { after_ms: 50 }));
            assert!(d.response_status.is_none());
        }

        #[tokio::test]
        async fn test_response_body_is_truncated() {
            let mut config = Config::default();
            config.delivery.max_response_body = 8;
            let h = harness_with(config, ScriptedSender::ok().with_body("accepted by receiver"));
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;

            let d = h.system.get_delivery(&emitted.delivery_ids[0]).unwrap().unwrap();
            assert_eq!(d.response_body.as_deref(), Some("accepted"));
            assert_eq!(d.metrics.response_size, Some(20));
        }

        #[tokio::test]
        async fn test_metrics_sink_receives_samples() {
            let clock = Arc::new(ManualClock::new(start_time()));
            let sink = Arc::new(RecordingSink::default());
            let system = WebhookEventSystem::builder(Config::default())
                .with_clock(clock)
                .with_sender(Arc::new(ScriptedSender::status(502)))
                .with_metrics(sink.clone())
                .build()
                .unwrap();
            system
                .register_subscription(NewSubscription::new(
                    "https://example.com/hooks/in",
                    vec![EventType::BookingCreated],
                ))
                .unwrap();
            let emitted = system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            system.dispatch_once().await;

            let samples = sink.samples.lock().unwrap();
            assert_eq!(samples.len(), 1);
            assert_eq!(samples[0].0, emitted.delivery_ids[0]);
            assert_eq!(samples[0].1.method, "POST");
            assert_eq!(samples[0].1.path, "/hooks/in");
            assert_eq!(samples[0].1.status_code, 502);
        }
    }

    mod health_tests {
        use super::*;
        use crate::models::HealthWarning;

        #[test]
        fn test_empty_statistics() {
            let h = harness(ScriptedSender::ok());
            let stats = h.system.get_statistics().unwrap();
            assert_eq!(stats.success_rate, 100.0);
            assert_eq!(stats.deliveries.total, 0);
            assert!(stats.average_delivery_ms.is_none());
            assert!(h.system.run_health_check().unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_statistics_after_mixed_outcomes() {
            let h = harness(ScriptedSender::ok().then_status(500));
            subscribe(&h, vec![EventType::BookingCreated], retries(1));
            subscribe(&h, vec![EventType::PaymentCompleted], Default::default());

            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.emit(EventType::PaymentCompleted, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;

            let stats = h.system.get_statistics().unwrap();
            assert_eq!(stats.subscriptions.total, 2);
            assert_eq!(stats.subscriptions.active, 2);
            assert_eq!(stats.deliveries.total, 3);
            assert_eq!(stats.deliveries.dead_letter, 1);
            assert_eq!(stats.deliveries.delivered, 2);
            assert_eq!(stats.dead_letter_queue_size, 1);
            assert_eq!(stats.retry_queue_size, 0);
            assert!((stats.success_rate - 200.0 / 3.0).abs() < 1e-9);
            assert!(stats.average_delivery_ms.is_some());
            assert_eq!(stats.total_events, 3);
            assert_eq!(stats.recent_events_24h, 3);
            assert_eq!(stats.top_event_types[0].event_type, EventType::BookingCreated);
            assert_eq!(stats.top_event_types[0].count, 2);
        }

        #[tokio::test]
        async fn test_low_success_rate_warning() {
            let mut config = Config::default();
            config.health.min_deliveries = 1;
            let h = harness_with(config, ScriptedSender::status(500));
            subscribe(&h, vec![EventType::BookingCreated], retries(1));
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;

            let warnings = h.system.run_health_check().unwrap();
            assert_eq!(
                warnings,
                vec![HealthWarning::LowSuccessRate {
                    success_rate: 0.0,
                    total_deliveries: 2
                }]
            );
        }

        #[test]
        fn test_retry_queue_backlog_warning() {
            let mut config = Config::default();
            config.health.max_retry_queue = 1;
            let h = harness_with(config, ScriptedSender::ok());
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert!(h.system.run_health_check().unwrap().is_empty());

            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            assert_eq!(
                h.system.run_health_check().unwrap(),
                vec![HealthWarning::RetryQueueBacklog { size: 2 }]
            );
        }

        #[test]
        fn test_recent_events_window() {
            let h = harness(ScriptedSender::ok());
            h.system.emit(EventType::QuoteSent, serde_json::json!({}), ctx());
            h.clock.advance(chrono::Duration::hours(25));
            h.system.emit(EventType::QuoteSent, serde_json::json!({}), ctx());

            let stats = h.system.get_statistics().unwrap();
            assert_eq!(stats.total_events, 2);
            assert_eq!(stats.recent_events_24h, 1);
        }

        #[tokio::test]
        async fn test_retention_purges_finished_deliveries() {
            let mut config = Config::default();
            config.delivery.retention_hours = 1;
            let h = harness_with(config, ScriptedSender::ok());
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let done = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;

            h.clock.advance(chrono::Duration::hours(2));
            let pending = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.run_health_check().unwrap();

            assert!(h.system.get_delivery(&done.delivery_ids[0]).unwrap().is_none());
            assert!(h.system.get_delivery(&pending.delivery_ids[0]).unwrap().is_some());
        }
    }

    mod store_tests {
        use super::*;
        use crate::models::DeliveryStatus;
        use crate::store::DeliveryStore;

        #[tokio::test]
        async fn test_take_due_keeps_future_retries() {
            let h = harness(ScriptedSender::status(500));
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            h.system.dispatch_once().await;

            assert!(h.deliveries.take_due(start_time()).unwrap().is_empty());
            assert_eq!(h.deliveries.queue_len().unwrap(), 1);

            let due = h
                .deliveries
                .take_due(start_time() + chrono::Duration::minutes(1))
                .unwrap();
            assert_eq!(due.len(), 1);
            assert_eq!(due[0].status, DeliveryStatus::Delivering);
            assert_eq!(h.deliveries.queue_len().unwrap(), 0);
        }

        #[test]
        fn test_reset_for_retry_skips_in_flight() {
            let h = harness(ScriptedSender::status(500));
            subscribe(&h, vec![EventType::BookingCreated], retries(1));
            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            let id = &emitted.delivery_ids[0];

            let claimed = h.deliveries.take_due(start_time()).unwrap();
            assert_eq!(claimed.len(), 1);
            assert!(!h.deliveries.reset_for_retry(id, start_time()).unwrap());
            assert_eq!(h.deliveries.queue_len().unwrap(), 0);

            let mut finished = claimed[0].clone();
            finished.attempt_count = 1;
            finished.status = DeliveryStatus::DeadLetter;
            h.deliveries.save(finished).unwrap();

            assert!(h.deliveries.reset_for_retry(id, start_time()).unwrap());
            assert!(h.deliveries.reset_for_retry(id, start_time()).unwrap());
            assert_eq!(h.deliveries.queue_len().unwrap(), 1);
            let reset = h.deliveries.get(id).unwrap().unwrap();
            assert_eq!(reset.status, DeliveryStatus::Pending);
            assert_eq!(reset.attempt_count, 0);
            assert!(reset.error.is_none());
            assert!(!h.deliveries.reset_for_retry("dlv_missing", start_time()).unwrap());
        }

        #[test]
        fn test_requeue_is_idempotent() {
            let h = harness(ScriptedSender::ok());
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            let emitted = h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());
            let id = &emitted.delivery_ids[0];

            assert!(h.deliveries.requeue(id).unwrap());
            assert_eq!(h.deliveries.queue_len().unwrap(), 1);
            assert!(!h.deliveries.requeue("dlv_missing").unwrap());
        }
    }

    mod config_tests {
        use crate::Config;

        #[test]
        fn test_default_config_is_valid() {
            let config = Config::default();
            assert!(config.validate().is_ok());
            assert_eq!(config.server.port, 3000);
            assert_eq!(config.delivery.dead_letter_threshold, 5);
            assert_eq!(config.events.history_limit, 1000);
        }

        #[test]
        fn test_partial_toml_uses_defaults() {
            let config = Config::from_toml(
                r#"
                [delivery]
                default_retry_attempts = 5

                [health]
                min_success_rate = 75.0
                "#,
            )
            .unwrap();
            assert_eq!(config.delivery.default_retry_attempts, 5);
            assert_eq!(config.delivery.base_delay_ms, 1_000);
            assert_eq!(config.health.min_success_rate, 75.0);
            assert_eq!(config.health.max_retry_queue, 100);
        }

        #[test]
        fn test_invalid_values_rejected() {
            assert!(Config::from_toml("[delivery]\ntick_interval_secs = 0").is_err());
            assert!(
                Config::from_toml("[delivery]\nbase_delay_ms = 5000\nmax_delay_ms = 1000").is_err()
            );
            assert!(Config::from_toml("[health]\nmin_success_rate = 150.0").is_err());
            assert!(Config::from_toml("[events]\nhistory_limit = 0").is_err());
        }

        #[test]
        fn test_builder_rejects_invalid_config() {
            use crate::error::WebhookError;
            use crate::WebhookEventSystem;

            let mut config = Config::default();
            config.delivery.tick_interval_secs = 0;
            let err = WebhookEventSystem::builder(config).build().err().unwrap();
            assert!(matches!(err, WebhookError::Validation(ref m) if m.contains("tick_interval")));
        }

        #[test]
        fn test_toml_round_trip() {
            let mut config = Config::default();
            config.server.port = 8088;
            config.events.environment = "staging".to_string();
            let parsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();
            assert_eq!(parsed.server.port, 8088);
            assert_eq!(parsed.events.environment, "staging");
        }

        #[test]
        fn test_init_writes_loadable_config() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("conf").join("webhooks.toml");

            crate::cli::init::run(&path, false).unwrap();
            let loaded = Config::load(&path).unwrap();
            assert_eq!(loaded.delivery.tick_interval_secs, 5);

            assert!(crate::cli::init::run(&path, false).is_err());
            assert!(crate::cli::init::run(&path, true).is_ok());
        }

        #[test]
        fn test_load_missing_file_mentions_init() {
            let dir = tempfile::tempdir().unwrap();
            let err = Config::load(&dir.path().join("absent.toml")).unwrap_err();
            assert!(err.to_string().contains("webhook-events init"));
        }
    }

    mod scheduler_tests {
        use super::*;
        use crate::services::scheduler::PeriodicTask;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[tokio::test]
        async fn test_periodic_task_runs_until_stopped() {
            let runs = Arc::new(AtomicUsize::new(0));
            let counter = runs.clone();
            let task = PeriodicTask::spawn("counter", Duration::from_millis(10), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });
            assert_eq!(task.name(), "counter");

            tokio::time::sleep(Duration::from_millis(60)).await;
            task.stop().await;
            let seen = runs.load(Ordering::SeqCst);
            assert!(seen >= 2, "only {} runs", seen);

            tokio::time::sleep(Duration::from_millis(30)).await;
            assert_eq!(runs.load(Ordering::SeqCst), seen);
        }

        #[tokio::test]
        async fn test_system_start_and_stop() {
            let mut config = Config::default();
            config.delivery.tick_interval_secs = 1;
            let h = harness_with(config, ScriptedSender::ok());
            subscribe(&h, vec![EventType::BookingCreated], Default::default());
            h.system.emit(EventType::BookingCreated, serde_json::json!({}), ctx());

            h.system.start();
            h.system.start();
            assert!(h.system.is_started());

            // The first interval tick fires immediately.
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert_eq!(h.sender.calls(), 1);

            h.system.stop().await;
            assert!(!h.system.is_started());
        }
    }
}
