//! Mock implementations for testing.

use async_trait::async_trait;
use cap_core::{ImpressionEvent, Result};
use parking_lot::Mutex;
use std::sync::Arc;

use analytics_sink::EventSink;

/// Mock sink that captures impressions in memory.
///
/// This implements the same `EventSink` trait as the real `ClickHouseSink`,
/// allowing tests to verify the exact impressions that would be written
/// without a ClickHouse instance.
#[derive(Clone)]
pub struct MockSink {
    /// All impressions written through this sink.
    events: Arc<Mutex<Vec<ImpressionEvent>>>,
    /// Simulate failures if set.
    should_fail: Arc<Mutex<bool>>,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
        }
    }

    /// Get all captured impressions.
    pub fn captured_events(&self) -> Vec<ImpressionEvent> {
        self.events.lock().clone()
    }

    /// Get the count of captured impressions.
    pub fn event_count(&self) -> usize {
        self.events.lock().len()
    }

    /// Clear captured impressions.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Set failure mode for testing error handling.
    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.lock() = fail;
    }

    /// Wait until at least `count` impressions have arrived.
    ///
    /// Impression writes are spawned off the request path, so tests poll
    /// briefly instead of asserting immediately.
    pub async fn wait_for_events(&self, count: usize) {
        for _ in 0..200 {
            if self.event_count() >= count {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!(
            "sink saw {} impressions, expected at least {}",
            self.event_count(),
            count
        );
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for MockSink {
    async fn write(&self, event: ImpressionEvent) -> Result<()> {
        if *self.should_fail.lock() {
            return Err(cap_core::Error::sink_write("Mock sink failure"));
        }

        self.events.lock().push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !*self.should_fail.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_event(campaign: &str) -> ImpressionEvent {
        ImpressionEvent::view("shop-test", campaign, "visitor-abc123", "sess-1", "https://shop.test/")
    }

    #[tokio::test]
    async fn test_mock_sink_captures_events() {
        let mock = MockSink::new();

        mock.write(test_event("cmp-1")).await.unwrap();
        assert_eq!(mock.event_count(), 1);

        let captured = mock.captured_events();
        assert_eq!(captured[0].campaign_id, "cmp-1");
    }

    #[tokio::test]
    async fn test_mock_sink_failure_mode() {
        let mock = MockSink::new();
        mock.set_should_fail(true);

        let result = mock.write(test_event("cmp-1")).await;
        assert!(result.is_err());
        assert!(!mock.is_healthy());
        assert_eq!(mock.event_count(), 0);
    }
}
