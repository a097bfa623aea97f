//! The frequency-capping service.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

use analytics_sink::SharedEventSink;
use cap_core::error::InputErrorCode;
use cap_core::{
    evaluate, resolve_raw, CounterKey, DegradedCause, DisplayDecision, FrequencyPolicy,
    ImpressionEvent, IncrementOutcome, RecordOutcome, Result,
};
use counter_store::SharedCounterStore;
use uuid::Uuid;
use telemetry::metrics;

use crate::bot::BotFilter;
use crate::config::EngineConfig;

/// One display record request, validated at the API boundary and again here.
#[derive(Debug, Clone, Default)]
pub struct DisplayRequest {
    /// Shop the storefront belongs to.
    pub store_id: String,
    /// Campaign or experiment identifier keying the counters.
    pub tracking_key: String,
    /// Database campaign id, when it differs from the tracking key.
    pub campaign_id: Option<String>,
    /// Experiment arm, when the display came from an experiment.
    pub experiment_id: Option<String>,
    pub visitor_id: String,
    pub session_id: String,
    pub page_url: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    /// Client-reported device type; derived from the UA when absent.
    pub device_type: Option<String>,
    pub metadata: Option<serde_json::Value>,
    /// Raw campaign `targetRules` document, when the caller inlines it.
    pub target_rules: Option<serde_json::Value>,
    /// Raw store `settings` document, when the caller inlines it.
    pub store_settings: Option<serde_json::Value>,
    pub template_type: Option<String>,
}

/// Decision and recording engine.
///
/// Holds the counter store and durable sink behind their traits; all state
/// lives in those collaborators, so the service itself is cheap to clone
/// through an `Arc`.
pub struct FrequencyCapService {
    store: SharedCounterStore,
    sink: SharedEventSink,
    bot_filter: Arc<BotFilter>,
    config: EngineConfig,
}

impl FrequencyCapService {
    pub fn new(store: SharedCounterStore, sink: SharedEventSink, config: EngineConfig) -> Self {
        let bot_filter = Arc::new(BotFilter::new(
            config.velocity_window_secs,
            config.velocity_max_events,
        ));
        Self {
            store,
            sink,
            bot_filter,
            config,
        }
    }

    fn store_deadline(&self) -> Duration {
        Duration::from_millis(self.config.store_timeout_ms)
    }

    /// Record one display.
    ///
    /// The only error is invalid caller input. Every degraded condition
    /// (malformed policy, store outage, store timeout, sink failure) is
    /// absorbed into the returned [`RecordOutcome`], and the impression is
    /// written fire-and-forget whenever the display proceeds.
    pub async fn record_display(&self, req: DisplayRequest) -> Result<RecordOutcome> {
        let start = Instant::now();
        metrics().displays_requested.inc();

        validate(&req)?;

        let policy = self.resolve_policy(&req);
        let now = Utc::now();

        // Velocity is observed for every request, flagged or not, so the
        // analytics record reflects what actually arrived.
        let velocity = self
            .bot_filter
            .observe(&req.visitor_id, req.ip_address.as_deref(), now);

        let screened = self.config.exclude_bots_from_caps
            && self
                .bot_filter
                .is_obvious_bot(&req.visitor_id, req.user_agent.as_deref());

        let outcome = if screened {
            // Crawlers see the popup but never consume a display slot.
            metrics().bot_screened.inc();
            debug!(
                tracking_key = %req.tracking_key,
                visitor_id = %req.visitor_id,
                "Screened bot traffic, skipping counters"
            );
            RecordOutcome::Recorded
        } else {
            self.checked_increment(&req, &policy, now).await
        };

        match outcome {
            RecordOutcome::Recorded => metrics().displays_recorded.inc(),
            RecordOutcome::Rejected(_) => metrics().displays_rejected.inc(),
            RecordOutcome::Degraded(_) => metrics().displays_degraded.inc(),
        }

        if outcome.is_displayed() {
            self.emit_impression(req, velocity, now);
        }

        metrics()
            .record_latency_ms
            .observe(start.elapsed().as_millis() as u64);

        Ok(outcome)
    }

    /// Decision-only evaluation: may this campaign display right now?
    ///
    /// Never mutates counters: an allowed decision that the storefront
    /// aborts client-side must not consume a display slot. Fails open when
    /// the store is out of reach.
    pub async fn decide(
        &self,
        store_id: &str,
        tracking_key: &str,
        visitor_id: &str,
        session_id: &str,
        policy: &FrequencyPolicy,
    ) -> DisplayDecision {
        metrics().decisions_requested.inc();

        let key = CounterKey::new(store_id, tracking_key, visitor_id, session_id);
        let now = Utc::now();

        let decision = match timeout(self.store_deadline(), self.store.snapshot(&key, now)).await {
            Ok(Ok(snapshot)) => evaluate(policy, &snapshot, now),
            Ok(Err(e)) => {
                metrics().store_errors.inc();
                warn!(error = %e, "Counter store failed during decision, failing open");
                DisplayDecision::allow()
            }
            Err(_) => {
                metrics().store_timeouts.inc();
                warn!(
                    timeout_ms = self.config.store_timeout_ms,
                    "Counter store missed deadline during decision, failing open"
                );
                DisplayDecision::allow()
            }
        };

        if !decision.allowed {
            metrics().decisions_denied.inc();
        }
        decision
    }

    /// Resolve the effective policy for a request, falling back to the
    /// conservative default when the configuration is malformed.
    pub fn resolve_policy(&self, req: &DisplayRequest) -> FrequencyPolicy {
        match resolve_raw(
            req.target_rules.as_ref(),
            req.store_settings.as_ref(),
            req.template_type.as_deref(),
        ) {
            Ok(policy) => policy,
            Err(e) => {
                metrics().policy_fallbacks.inc();
                warn!(
                    tracking_key = %req.tracking_key,
                    error = %e,
                    "Malformed frequency config, using conservative default"
                );
                FrequencyPolicy::conservative_default()
            }
        }
    }

    async fn checked_increment(
        &self,
        req: &DisplayRequest,
        policy: &FrequencyPolicy,
        now: chrono::DateTime<Utc>,
    ) -> RecordOutcome {
        let key = CounterKey::new(
            &req.store_id,
            &req.tracking_key,
            &req.visitor_id,
            &req.session_id,
        );

        let store_start = Instant::now();
        let result = timeout(
            self.store_deadline(),
            self.store.check_and_increment(&key, policy, now),
        )
        .await;
        metrics()
            .store_latency_ms
            .observe(store_start.elapsed().as_millis() as u64);

        match result {
            Ok(Ok(IncrementOutcome::Allowed(_))) => RecordOutcome::Recorded,
            Ok(Ok(IncrementOutcome::Denied(reason))) => {
                debug!(
                    tracking_key = %req.tracking_key,
                    visitor_id = %req.visitor_id,
                    reason = reason.as_str(),
                    "Display denied"
                );
                RecordOutcome::Rejected(reason)
            }
            Ok(Err(e)) => {
                metrics().store_errors.inc();
                warn!(
                    tracking_key = %req.tracking_key,
                    error = %e,
                    "Counter store unavailable, failing open"
                );
                RecordOutcome::Degraded(DegradedCause::StoreUnavailable)
            }
            Err(_) => {
                metrics().store_timeouts.inc();
                warn!(
                    tracking_key = %req.tracking_key,
                    timeout_ms = self.config.store_timeout_ms,
                    "Counter store missed deadline, failing open"
                );
                RecordOutcome::Degraded(DegradedCause::StoreTimeout)
            }
        }
    }

    /// Build the durable record and hand it to the sink off-path.
    ///
    /// Full bot classification happens inside the spawned task so it never
    /// blocks the caller; flagged events are written, never dropped.
    fn emit_impression(&self, req: DisplayRequest, velocity: u32, now: chrono::DateTime<Utc>) {
        let sink = self.sink.clone();
        let bot_filter = self.bot_filter.clone();

        tokio::spawn(async move {
            let suspected_bot =
                bot_filter.classify(&req.visitor_id, req.user_agent.as_deref(), velocity);
            if suspected_bot {
                metrics().bot_flagged.inc();
            }

            let device_type = match req.device_type {
                Some(ref d) if !d.is_empty() => d.clone(),
                _ => bot_filter.device_type(req.user_agent.as_deref()).to_string(),
            };

            let campaign_id = req
                .campaign_id
                .clone()
                .unwrap_or_else(|| req.tracking_key.clone());

            let event = ImpressionEvent {
                id: Uuid::new_v4(),
                store_id: req.store_id,
                campaign_id,
                experiment_id: req.experiment_id,
                visitor_id: req.visitor_id,
                session_id: req.session_id,
                event_type: cap_core::EventType::View,
                page_url: req.page_url,
                referrer: req.referrer,
                user_agent: req.user_agent,
                ip_address: req.ip_address,
                device_type,
                suspected_bot,
                metadata: req.metadata,
                created_at: now,
            };

            if let Err(e) = sink.write(event).await {
                // Logged only; the display already happened.
                warn!(error = %e, "Failed to enqueue impression");
            }
        });
    }
}

/// Caller input validation, the only path that can fail a request.
fn validate(req: &DisplayRequest) -> Result<()> {
    if req.tracking_key.trim().is_empty() {
        return Err(cap_core::Error::input(
            InputErrorCode::MissingTrackingKey,
            "tracking key is required",
        ));
    }
    if req.visitor_id.trim().is_empty() {
        return Err(cap_core::Error::input(
            InputErrorCode::MissingVisitor,
            "visitor id is required",
        ));
    }
    if req.session_id.trim().is_empty() {
        return Err(cap_core::Error::input(
            InputErrorCode::InvalidPayload,
            "session id is required",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cap_core::{CounterSnapshot, DenialReason};
    use counter_store::{CounterStore, MemoryCounterStore, StoreConfig};
    use parking_lot::Mutex;
    use serde_json::json;

    const CHROME_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const GOOGLEBOT_UA: &str =
        "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    /// Sink that captures events in memory.
    #[derive(Default)]
    struct CapturingSink {
        events: Mutex<Vec<ImpressionEvent>>,
    }

    #[async_trait]
    impl analytics_sink::EventSink for CapturingSink {
        async fn write(&self, event: ImpressionEvent) -> Result<()> {
            self.events.lock().push(event);
            Ok(())
        }

        async fn flush(&self) -> Result<()> {
            Ok(())
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    impl CapturingSink {
        fn captured(&self) -> Vec<ImpressionEvent> {
            self.events.lock().clone()
        }
    }

    /// Store that always errors, for fail-open tests.
    struct FailingStore;

    #[async_trait]
    impl CounterStore for FailingStore {
        async fn check_and_increment(
            &self,
            _key: &CounterKey,
            _policy: &FrequencyPolicy,
            _now: chrono::DateTime<Utc>,
        ) -> Result<IncrementOutcome> {
            Err(cap_core::Error::store_unavailable("connection refused"))
        }

        async fn snapshot(
            &self,
            _key: &CounterKey,
            _now: chrono::DateTime<Utc>,
        ) -> Result<CounterSnapshot> {
            Err(cap_core::Error::store_unavailable("connection refused"))
        }

        fn is_healthy(&self) -> bool {
            false
        }
    }

    /// Store that never answers, for deadline tests.
    struct HangingStore;

    #[async_trait]
    impl CounterStore for HangingStore {
        async fn check_and_increment(
            &self,
            _key: &CounterKey,
            _policy: &FrequencyPolicy,
            _now: chrono::DateTime<Utc>,
        ) -> Result<IncrementOutcome> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("deadline fires first")
        }

        async fn snapshot(
            &self,
            _key: &CounterKey,
            _now: chrono::DateTime<Utc>,
        ) -> Result<CounterSnapshot> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("deadline fires first")
        }

        fn is_healthy(&self) -> bool {
            true
        }
    }

    fn service_with(
        store: SharedCounterStore,
    ) -> (FrequencyCapService, Arc<CapturingSink>) {
        let sink = Arc::new(CapturingSink::default());
        let service = FrequencyCapService::new(store, sink.clone(), EngineConfig::default());
        (service, sink)
    }

    fn request() -> DisplayRequest {
        DisplayRequest {
            store_id: "shop-1".into(),
            tracking_key: "cmp-1".into(),
            visitor_id: "visitor-abc123".into(),
            session_id: "sess-1".into(),
            page_url: "https://shop.test/products/tea".into(),
            user_agent: Some(CHROME_UA.into()),
            target_rules: Some(json!({
                "enhancedTriggers": {
                    "frequency_capping": {"maxDisplaysPerSession": 2}
                }
            })),
            ..Default::default()
        }
    }

    async fn wait_for_events(sink: &CapturingSink, count: usize) {
        for _ in 0..100 {
            if sink.events.lock().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("sink never saw {} events", count);
    }

    #[tokio::test]
    async fn test_record_allows_then_rejects_at_session_cap() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, sink) = service_with(store);

        for _ in 0..2 {
            let outcome = service.record_display(request()).await.unwrap();
            assert_eq!(outcome, RecordOutcome::Recorded);
        }

        let outcome = service.record_display(request()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Rejected(DenialReason::SessionCap));

        // Exactly the two accepted displays reach the sink.
        wait_for_events(&sink, 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.captured().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_records_cannot_exceed_cap() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, _sink) = service_with(store);
        let service = Arc::new(service);

        let cap = 3usize;
        let mut handles = Vec::new();
        for _ in 0..(cap + 5) {
            let service = service.clone();
            let mut req = request();
            req.target_rules = Some(json!({
                "enhancedTriggers": {
                    "frequency_capping": {"maxDisplaysPerSession": cap}
                }
            }));
            handles.push(tokio::spawn(async move {
                service.record_display(req).await.unwrap()
            }));
        }

        let mut recorded = 0;
        for handle in handles {
            if handle.await.unwrap() == RecordOutcome::Recorded {
                recorded += 1;
            }
        }
        assert_eq!(recorded, cap, "exactly {} of {} races may win", cap, cap + 5);
    }

    #[tokio::test]
    async fn test_store_outage_fails_open_without_error() {
        let (service, sink) = service_with(Arc::new(FailingStore));

        let outcome = service.record_display(request()).await.unwrap();
        assert_eq!(
            outcome,
            RecordOutcome::Degraded(DegradedCause::StoreUnavailable)
        );
        assert!(outcome.is_displayed());

        // The impression is still written in degraded mode.
        wait_for_events(&sink, 1).await;
    }

    #[tokio::test]
    async fn test_store_deadline_miss_fails_open() {
        let (service, _sink) = service_with(Arc::new(HangingStore));

        let outcome = service.record_display(request()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Degraded(DegradedCause::StoreTimeout));
    }

    #[tokio::test]
    async fn test_decide_does_not_consume_a_slot() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, _sink) = service_with(store);
        let policy = FrequencyPolicy {
            max_per_session: Some(1),
            ..Default::default()
        };

        for _ in 0..5 {
            let decision = service
                .decide("shop-1", "cmp-1", "visitor-abc123", "sess-1", &policy)
                .await;
            assert!(decision.allowed, "decisions alone must never consume");
        }

        assert_eq!(
            service.record_display(request()).await.unwrap(),
            RecordOutcome::Recorded
        );
    }

    #[tokio::test]
    async fn test_decide_fails_open_on_outage() {
        let (service, _sink) = service_with(Arc::new(FailingStore));
        let policy = FrequencyPolicy {
            max_per_session: Some(1),
            ..Default::default()
        };

        let decision = service
            .decide("shop-1", "cmp-1", "visitor-abc123", "sess-1", &policy)
            .await;
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_bot_event_flagged_and_written_not_dropped() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, sink) = service_with(store.clone());

        let mut req = request();
        req.user_agent = Some(GOOGLEBOT_UA.into());

        let outcome = service.record_display(req).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Recorded);

        wait_for_events(&sink, 1).await;
        let events = sink.captured();
        assert!(events[0].suspected_bot, "bot events carry the flag");
        assert_eq!(events[0].device_type, "bot");

        // Screened bots never touched the counters.
        let key = CounterKey::new("shop-1", "cmp-1", "visitor-abc123", "sess-1");
        let snapshot = store.snapshot(&key, Utc::now()).await.unwrap();
        assert_eq!(snapshot.lifetime_count, 0);
    }

    #[tokio::test]
    async fn test_missing_identifiers_are_the_only_errors() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, _sink) = service_with(store);

        let mut req = request();
        req.tracking_key = "".into();
        let err = service.record_display(req).await.unwrap_err();
        assert_eq!(err.error_code(), Some("INPUT_001"));

        let mut req = request();
        req.visitor_id = "  ".into();
        let err = service.record_display(req).await.unwrap_err();
        assert_eq!(err.error_code(), Some("INPUT_002"));
    }

    #[tokio::test]
    async fn test_malformed_rules_fall_back_to_conservative_default() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, _sink) = service_with(store);

        let mut req = request();
        req.target_rules = Some(json!({
            "enhancedTriggers": {"frequency_capping": {"maxDisplaysPerSession": "lots"}}
        }));

        // Conservative default allows exactly one display per session.
        let outcome = service.record_display(req.clone()).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Recorded);

        let outcome = service.record_display(req).await.unwrap();
        assert_eq!(outcome, RecordOutcome::Rejected(DenialReason::SessionCap));
    }

    #[tokio::test]
    async fn test_cooldown_scenario_with_store_policy_merge() {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let (service, _sink) = service_with(store);

        // Campaign session cap 2 + 30s cooldown; store session cap 5.
        let mut req = request();
        req.target_rules = Some(json!({
            "enhancedTriggers": {
                "frequency_capping": {"maxDisplaysPerSession": 2, "cooldownSeconds": 30}
            }
        }));
        req.store_settings = Some(json!({
            "frequencyCapping": {"maxDisplaysPerSession": 5}
        }));

        let policy = service.resolve_policy(&req);
        assert_eq!(policy.max_per_session, Some(2));
        assert_eq!(policy.cooldown_seconds, Some(30));

        // First display lands; an immediate repeat trips the cooldown.
        assert_eq!(
            service.record_display(req.clone()).await.unwrap(),
            RecordOutcome::Recorded
        );
        assert_eq!(
            service.record_display(req).await.unwrap(),
            RecordOutcome::Rejected(DenialReason::CooldownActive)
        );
    }
}
