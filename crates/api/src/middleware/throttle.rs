//! Per-client request throttle.
//!
//! A coarse token bucket per client IP in front of the storefront routes.
//! This is plumbing against runaway scripts, not the frequency-capping
//! logic itself; caps are enforced per visitor inside the engine.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Token bucket throttle keyed by client IP.
pub struct Throttle {
    buckets: Mutex<HashMap<String, TokenBucket>>,
    config: ThrottleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Requests per second per client
    #[serde(default = "default_rate")]
    pub rate: u32,
    /// Burst size per client
    #[serde(default = "default_burst")]
    pub burst: u32,
}

fn default_rate() -> u32 {
    50
}

fn default_burst() -> u32 {
    200
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            burst: default_burst(),
        }
    }
}

struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(burst: u32) -> Self {
        Self {
            tokens: burst as f64,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, rate: u32, burst: u32) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        self.last_update = now;

        // Replenish tokens
        self.tokens = (self.tokens + elapsed * rate as f64).min(burst as f64);

        // Try to consume a token
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Check if a request is allowed for the given client key.
    ///
    /// Requests without a resolvable client IP pass through; the engine's
    /// velocity tracking still covers them per visitor.
    pub fn check(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return true;
        };

        let mut buckets = self.buckets.lock();

        let bucket = buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.config.burst));

        bucket.try_acquire(self.config.rate, self.config.burst)
    }

    /// Clean up stale buckets.
    pub fn cleanup_stale(&self, max_age: Duration) {
        let mut buckets = self.buckets.lock();
        let now = Instant::now();

        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_age);
    }

    /// Start the periodic stale-bucket cleanup.
    /// Returns a handle that can be used to cancel the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let throttle = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300)); // 5 minutes
            loop {
                interval.tick().await;
                throttle.cleanup_stale(Duration::from_secs(600));
            }
        })
    }
}

/// Shared throttle state.
pub type SharedThrottle = Arc<Throttle>;
