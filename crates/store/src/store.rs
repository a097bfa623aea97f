//! Counter store trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use cap_core::{CounterKey, CounterSnapshot, FrequencyPolicy, IncrementOutcome, Result};

/// Storage seam for display counters.
///
/// Implementations must make `check_and_increment` atomic per
/// (visitor, campaign): the cap re-check and the increment happen in one
/// indivisible unit. `now` is passed in rather than read from the clock so
/// window arithmetic is deterministic under test.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically evaluate every cap dimension and, if all pass, increment
    /// session/day/lifetime counts, bump the visitor's cross-campaign
    /// session total, and stamp `last_displayed_at`.
    async fn check_and_increment(
        &self,
        key: &CounterKey,
        policy: &FrequencyPolicy,
        now: DateTime<Utc>,
    ) -> Result<IncrementOutcome>;

    /// Read-only view of the counters for a key; missing counters read as
    /// all zeros. Used by decision-only calls, which must not consume a
    /// display slot.
    async fn snapshot(&self, key: &CounterKey, now: DateTime<Utc>) -> Result<CounterSnapshot>;

    /// Whether the store considers itself reachable.
    fn is_healthy(&self) -> bool;
}

/// Shared counter store handle.
pub type SharedCounterStore = Arc<dyn CounterStore>;
