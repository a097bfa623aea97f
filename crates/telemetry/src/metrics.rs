//! Internal metrics collection.
//!
//! Collects metrics in-memory and periodically flushes to ClickHouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &bound) in Self::BUCKET_BOUNDS.iter().enumerate() {
            if ms <= bound {
                self.buckets[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        // Value exceeds all buckets, add to last
        self.buckets[10].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the frequency-capping engine.
#[derive(Debug, Default)]
pub struct Metrics {
    // Record path
    pub displays_requested: Counter,
    pub displays_recorded: Counter,
    pub displays_rejected: Counter,
    pub displays_degraded: Counter,

    // Decision-only path
    pub decisions_requested: Counter,
    pub decisions_denied: Counter,

    // Policy resolution
    pub policy_fallbacks: Counter,
    pub policy_cache_misses: Counter,

    // Bot filter
    pub bot_screened: Counter,
    pub bot_flagged: Counter,

    // Counter store
    pub store_errors: Counter,
    pub store_timeouts: Counter,

    // Durable impression sink
    pub impressions_written: Counter,
    pub impression_write_errors: Counter,
    pub impression_write_retries: Counter,

    // HTTP edge
    pub throttled_requests: Counter,

    // Latency histograms
    pub record_latency_ms: Histogram,
    pub store_latency_ms: Histogram,
    pub sink_flush_latency_ms: Histogram,

    // Gauges
    pub counter_entries: Gauge,
    pub pending_impressions: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub displays_requested: u64,
    pub displays_recorded: u64,
    pub displays_rejected: u64,
    pub displays_degraded: u64,
    pub decisions_requested: u64,
    pub decisions_denied: u64,
    pub policy_fallbacks: u64,
    pub bot_screened: u64,
    pub bot_flagged: u64,
    pub store_errors: u64,
    pub store_timeouts: u64,
    pub impressions_written: u64,
    pub impression_write_errors: u64,
    pub throttled_requests: u64,
    pub record_latency_mean_ms: f64,
    pub store_latency_mean_ms: f64,
    pub sink_flush_latency_mean_ms: f64,
    pub counter_entries: u64,
    pub pending_impressions: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            displays_requested: self.displays_requested.get(),
            displays_recorded: self.displays_recorded.get(),
            displays_rejected: self.displays_rejected.get(),
            displays_degraded: self.displays_degraded.get(),
            decisions_requested: self.decisions_requested.get(),
            decisions_denied: self.decisions_denied.get(),
            policy_fallbacks: self.policy_fallbacks.get(),
            bot_screened: self.bot_screened.get(),
            bot_flagged: self.bot_flagged.get(),
            store_errors: self.store_errors.get(),
            store_timeouts: self.store_timeouts.get(),
            impressions_written: self.impressions_written.get(),
            impression_write_errors: self.impression_write_errors.get(),
            throttled_requests: self.throttled_requests.get(),
            record_latency_mean_ms: self.record_latency_ms.mean(),
            store_latency_mean_ms: self.store_latency_ms.mean(),
            sink_flush_latency_mean_ms: self.sink_flush_latency_ms.mean(),
            counter_entries: self.counter_entries.get(),
            pending_impressions: self.pending_impressions.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
