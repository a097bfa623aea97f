//! Event sink trait and the buffered ClickHouse implementation.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use cap_core::{ImpressionEvent, Result};
use telemetry::metrics;

use crate::batch::{BatchAccumulator, ImpressionBatch};
use crate::client::ClickHouseClient;
use crate::config::SinkConfig;
use crate::insert::insert_impressions;

/// Durable destination for impression events.
///
/// `write` must return quickly: implementations buffer and flush in the
/// background. A failed write is the sink's problem; callers treat the
/// impression as recorded either way.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Enqueue one impression for durable storage.
    async fn write(&self, event: ImpressionEvent) -> Result<()>;

    /// Flush anything buffered. Called on shutdown.
    async fn flush(&self) -> Result<()>;

    /// Whether the sink considers its backend reachable.
    fn is_healthy(&self) -> bool;
}

/// Shared event sink handle.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Buffered ClickHouse sink.
///
/// Rows accumulate until the size bound (flushed inline, already off the
/// request path) or the age bound (flushed by the background task). Each
/// batch gets a bounded number of attempts with a linearly growing delay;
/// after the last attempt the batch is dropped and counted.
pub struct ClickHouseSink {
    client: ClickHouseClient,
    accumulator: BatchAccumulator,
    config: SinkConfig,
    healthy: AtomicBool,
}

impl ClickHouseSink {
    pub fn new(client: ClickHouseClient, config: SinkConfig) -> Self {
        let accumulator = BatchAccumulator::new(
            config.batch_size,
            Duration::from_millis(config.batch_age_ms),
        );
        Self {
            client,
            accumulator,
            config,
            healthy: AtomicBool::new(true),
        }
    }

    /// Flush one batch with bounded retries. Never errors; a batch that
    /// exhausts its attempts is dropped with an error log.
    async fn flush_batch(&self, batch: ImpressionBatch) {
        let count = batch.len();
        let events = batch.events;

        for attempt in 1..=self.config.flush_attempts {
            match insert_impressions(&self.client, events.clone()).await {
                Ok(written) => {
                    self.healthy.store(true, Ordering::Relaxed);
                    debug!(written = written, attempt = attempt, "Flushed impression batch");
                    return;
                }
                Err(e) if attempt < self.config.flush_attempts => {
                    metrics().impression_write_retries.inc();
                    warn!(
                        attempt = attempt,
                        count = count,
                        error = %e,
                        "Impression flush failed, will retry"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        self.config.retry_delay_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => {
                    self.healthy.store(false, Ordering::Relaxed);
                    metrics().impression_write_errors.inc_by(count as u64);
                    error!(
                        count = count,
                        error = %e,
                        "Dropping impression batch after {} attempts",
                        self.config.flush_attempts
                    );
                }
            }
        }
    }

    /// Start the background age-based flush task.
    /// Returns a handle that can be used to cancel the task.
    pub fn start_flush_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let sink = self.clone();
        let tick = Duration::from_millis(sink.config.batch_age_ms.max(100));
        info!(interval_ms = tick.as_millis() as u64, "Started impression flush task");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            loop {
                interval.tick().await;
                if let Some(batch) = sink.accumulator.take_aged() {
                    sink.flush_batch(batch).await;
                }
            }
        })
    }
}

#[async_trait]
impl EventSink for ClickHouseSink {
    async fn write(&self, event: ImpressionEvent) -> Result<()> {
        if let Some(batch) = self.accumulator.add(event) {
            self.flush_batch(batch).await;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        if let Some(batch) = self.accumulator.take_all() {
            self.flush_batch(batch).await;
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}
