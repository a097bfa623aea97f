//! Common test setup functions.

use api::middleware::throttle::ThrottleConfig;
use api::{router, AppState};
use axum::Router;
use counter_store::{CounterStore, MemoryCounterStore, StoreConfig};
use frequency_engine::{EngineConfig, FrequencyCapService};
use std::sync::Arc;

use crate::mocks::MockSink;

/// Test context with a real engine, real in-memory counter store, and a
/// mock impression sink.
///
/// This exercises the same production code paths by:
/// - using the real Axum router with all middleware
/// - using the real MemoryCounterStore for cap semantics
/// - using MockSink which implements the EventSink trait
pub struct TestContext {
    pub store: Arc<MemoryCounterStore>,
    pub mock_sink: Arc<MockSink>,
    pub service: Arc<FrequencyCapService>,
    pub router: Router,
}

impl TestContext {
    /// Create a new test context with all components initialized.
    pub fn new() -> Self {
        Self::with_throttle(ThrottleConfig::default())
    }

    /// Create a test context with a custom throttle config.
    pub fn with_throttle(throttle: ThrottleConfig) -> Self {
        let store = Arc::new(MemoryCounterStore::new(StoreConfig::default()));
        let mock_sink = Arc::new(MockSink::new());

        let service = Arc::new(FrequencyCapService::new(
            store.clone() as Arc<dyn CounterStore>,
            mock_sink.clone(),
            EngineConfig::default(),
        ));

        // Health is process-global; the store is always up in tests.
        telemetry::health().counter_store.set_healthy();

        // "mock" admin URL keeps the campaign config client offline.
        let state = AppState::with_throttle(service.clone(), "mock", throttle);
        let router = router(state);

        Self {
            store,
            mock_sink,
            service,
            router,
        }
    }

    /// Get all impressions captured by the mock sink.
    pub fn captured_events(&self) -> Vec<cap_core::ImpressionEvent> {
        self.mock_sink.captured_events()
    }

    /// Clear captured impressions (use between tests).
    pub fn clear_captured(&self) {
        self.mock_sink.clear();
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
