//! Sharded in-memory counter store.
//!
//! Shards are keyed by (store, visitor) so one shard lock covers both a
//! campaign's counter entry and the visitor's cross-campaign session total:
//! the whole check-and-increment is a single critical section, which gives
//! serializability per visitor, a superset of the per (visitor, campaign)
//! guarantee the engine needs.
//!
//! Windows are lazy: session and day counts are interpreted against the
//! current session id / UTC calendar day at read time, and physically reset
//! on the next write after a rollover. A periodic sweep drops visitors idle
//! past the retention window.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Utc};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, info};

use cap_core::{
    evaluate, CounterKey, CounterSnapshot, FrequencyPolicy, IncrementOutcome, Result,
};
use telemetry::metrics;

use crate::config::StoreConfig;
use crate::store::CounterStore;

/// Per-campaign counters for one visitor.
#[derive(Debug, Clone)]
struct CounterEntry {
    /// Session id the session window is currently bound to.
    session_id: String,
    session_count: u32,
    session_touched_at: DateTime<Utc>,
    /// Days-from-CE ordinal of the day window.
    day_ordinal: i32,
    day_count: u32,
    lifetime_count: u32,
    last_displayed_at: Option<DateTime<Utc>>,
}

impl CounterEntry {
    fn new(session_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            session_count: 0,
            session_touched_at: now,
            day_ordinal: now.date_naive().num_days_from_ce(),
            day_count: 0,
            lifetime_count: 0,
            last_displayed_at: None,
        }
    }

    fn session_live(&self, session_id: &str, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.session_id == session_id && now - self.session_touched_at <= timeout
    }

    fn day_live(&self, now: DateTime<Utc>) -> bool {
        self.day_ordinal == now.date_naive().num_days_from_ce()
    }
}

/// Cross-campaign session display total for one visitor.
#[derive(Debug, Clone)]
struct SessionTotal {
    session_id: String,
    count: u32,
    touched_at: DateTime<Utc>,
}

/// All counter state for one (store, visitor).
#[derive(Debug, Default)]
struct VisitorCounters {
    campaigns: HashMap<String, CounterEntry>,
    session_total: Option<SessionTotal>,
    touched_at: Option<DateTime<Utc>>,
}

type Shard = Mutex<HashMap<(String, String), VisitorCounters>>;

/// Sharded in-memory [`CounterStore`].
pub struct MemoryCounterStore {
    shards: Vec<Shard>,
    config: StoreConfig,
}

impl MemoryCounterStore {
    pub fn new(config: StoreConfig) -> Self {
        let shard_count = config.shards.max(1).next_power_of_two();
        let shards = (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect();
        Self { shards, config }
    }

    fn shard_for(&self, key: &CounterKey) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.store_id.hash(&mut hasher);
        key.visitor_id.hash(&mut hasher);
        let idx = (hasher.finish() as usize) & (self.shards.len() - 1);
        &self.shards[idx]
    }

    fn session_timeout(&self) -> Duration {
        Duration::minutes(self.config.session_timeout_minutes)
    }

    /// Window-adjusted read of one visitor's counters for a key.
    fn read_snapshot(
        &self,
        visitor: &VisitorCounters,
        key: &CounterKey,
        now: DateTime<Utc>,
    ) -> CounterSnapshot {
        let timeout = self.session_timeout();

        let (session_count, day_count, lifetime_count, last_displayed_at) =
            match visitor.campaigns.get(&key.tracking_key) {
                Some(entry) => (
                    if entry.session_live(&key.session_id, now, timeout) {
                        entry.session_count
                    } else {
                        0
                    },
                    if entry.day_live(now) { entry.day_count } else { 0 },
                    entry.lifetime_count,
                    entry.last_displayed_at,
                ),
                None => (0, 0, 0, None),
            };

        let global_session_count = match &visitor.session_total {
            Some(total)
                if total.session_id == key.session_id && now - total.touched_at <= timeout =>
            {
                total.count
            }
            _ => 0,
        };

        CounterSnapshot {
            session_count,
            day_count,
            lifetime_count,
            global_session_count,
            last_displayed_at,
        }
    }

    /// Total visitor entries across shards.
    pub fn entry_count(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Drop visitors idle past the retention window. Returns the number of
    /// entries removed.
    pub fn cleanup_stale(&self, now: DateTime<Utc>) -> usize {
        let retention = Duration::hours(self.config.retention_hours);
        let mut removed = 0;

        for shard in &self.shards {
            let mut map = shard.lock();
            let before = map.len();
            map.retain(|_, visitor| match visitor.touched_at {
                Some(touched) => now - touched <= retention,
                None => false,
            });
            removed += before - map.len();
        }

        metrics().counter_entries.set(self.entry_count() as u64);
        if removed > 0 {
            debug!(removed = removed, "Swept stale counter entries");
        }
        removed
    }

    /// Start the periodic stale-entry sweep.
    /// Returns a handle that can be used to cancel the task.
    pub fn start_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        let interval_secs = store.config.cleanup_interval_secs;
        info!(interval_secs = interval_secs, "Started counter cleanup task");
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                store.cleanup_stale(Utc::now());
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn check_and_increment(
        &self,
        key: &CounterKey,
        policy: &FrequencyPolicy,
        now: DateTime<Utc>,
    ) -> Result<IncrementOutcome> {
        let timeout = self.session_timeout();
        let mut shard = self.shard_for(key).lock();

        let visitor = shard
            .entry((key.store_id.clone(), key.visitor_id.clone()))
            .or_default();

        // Evaluate against the windowed view; deny without mutating.
        let snapshot = {
            let visitor_ref: &VisitorCounters = visitor;
            self.read_snapshot(visitor_ref, key, now)
        };
        let decision = evaluate(policy, &snapshot, now);
        if let Some(reason) = decision.reason {
            return Ok(IncrementOutcome::Denied(reason));
        }

        // All caps passed; roll windows and increment inside the same lock.
        let entry = visitor
            .campaigns
            .entry(key.tracking_key.clone())
            .or_insert_with(|| CounterEntry::new(&key.session_id, now));

        if !entry.session_live(&key.session_id, now, timeout) {
            entry.session_id = key.session_id.clone();
            entry.session_count = 0;
        }
        if !entry.day_live(now) {
            entry.day_ordinal = now.date_naive().num_days_from_ce();
            entry.day_count = 0;
        }

        entry.session_count += 1;
        entry.session_touched_at = now;
        entry.day_count += 1;
        entry.lifetime_count += 1;
        entry.last_displayed_at = Some(now);

        let total = match &mut visitor.session_total {
            Some(total)
                if total.session_id == key.session_id && now - total.touched_at <= timeout =>
            {
                total.count += 1;
                total.touched_at = now;
                total.count
            }
            _ => {
                visitor.session_total = Some(SessionTotal {
                    session_id: key.session_id.clone(),
                    count: 1,
                    touched_at: now,
                });
                1
            }
        };

        visitor.touched_at = Some(now);

        let entry_snapshot = CounterSnapshot {
            session_count: entry.session_count,
            day_count: entry.day_count,
            lifetime_count: entry.lifetime_count,
            global_session_count: total,
            last_displayed_at: entry.last_displayed_at,
        };

        Ok(IncrementOutcome::Allowed(entry_snapshot))
    }

    async fn snapshot(&self, key: &CounterKey, now: DateTime<Utc>) -> Result<CounterSnapshot> {
        let shard = self.shard_for(key).lock();
        let snapshot = match shard.get(&(key.store_id.clone(), key.visitor_id.clone())) {
            Some(visitor) => self.read_snapshot(visitor, key, now),
            None => CounterSnapshot::default(),
        };
        Ok(snapshot)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
