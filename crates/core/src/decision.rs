//! Display decision evaluation.
//!
//! [`evaluate`] is the single pure function both read paths share: the
//! decision endpoint evaluates a snapshot, and the counter store re-runs
//! the same function inside its atomic increment so the two can never
//! disagree about what a policy means.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::counter::CounterSnapshot;
use crate::policy::FrequencyPolicy;

/// Why a display was denied.
///
/// Dimensions are checked in a fixed order (cooldown, session, day,
/// lifetime, global) and the first failure wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    CooldownActive,
    SessionCap,
    DayCap,
    LifetimeCap,
    GlobalCap,
}

impl DenialReason {
    /// Wire representation, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CooldownActive => "COOLDOWN_ACTIVE",
            Self::SessionCap => "SESSION_CAP",
            Self::DayCap => "DAY_CAP",
            Self::LifetimeCap => "LIFETIME_CAP",
            Self::GlobalCap => "GLOBAL_CAP",
        }
    }
}

/// Outcome of one decision call. Ephemeral; the engine never retries a
/// decision on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
}

impl DisplayDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Evaluate a policy against current counters.
///
/// Order: cooldown (cheapest, most common denial) → session → day →
/// lifetime → store-wide global cap. Short-circuits on the first failing
/// dimension. `count >= cap` denies: the Nth display is the last one a cap
/// of N allows. Never mutates anything.
pub fn evaluate(
    policy: &FrequencyPolicy,
    counters: &CounterSnapshot,
    now: DateTime<Utc>,
) -> DisplayDecision {
    if let (Some(cooldown), Some(last)) = (policy.cooldown_seconds, counters.last_displayed_at) {
        if now - last < Duration::seconds(cooldown as i64) {
            return DisplayDecision::deny(DenialReason::CooldownActive);
        }
    }

    if let Some(cap) = policy.max_per_session {
        if counters.session_count >= cap {
            return DisplayDecision::deny(DenialReason::SessionCap);
        }
    }

    if let Some(cap) = policy.max_per_day {
        if counters.day_count >= cap {
            return DisplayDecision::deny(DenialReason::DayCap);
        }
    }

    if let Some(cap) = policy.max_per_visitor {
        if counters.lifetime_count >= cap {
            return DisplayDecision::deny(DenialReason::LifetimeCap);
        }
    }

    if let Some(cap) = policy.global_session_max {
        if counters.global_session_count >= cap {
            return DisplayDecision::deny(DenialReason::GlobalCap);
        }
    }

    DisplayDecision::allow()
}

/// What degraded the record path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedCause {
    /// Counter store errored.
    StoreUnavailable,
    /// Counter store missed its deadline.
    StoreTimeout,
}

/// Typed result of a record call.
///
/// The engine never signals degraded conditions as errors; the thin API
/// layer decides how to log and serialize each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Display allowed and counted.
    Recorded,
    /// Display denied by a cap dimension; nothing counted.
    Rejected(DenialReason),
    /// Counter store out of reach; display allowed fail-open, uncounted.
    Degraded(DegradedCause),
}

impl RecordOutcome {
    /// Whether the storefront should show the popup.
    pub fn is_displayed(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Wire representation for API responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Rejected(_) => "rejected",
            Self::Degraded(_) => "degraded",
        }
    }
}
