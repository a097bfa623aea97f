//! Display counter types.
//!
//! Counters are owned exclusively by the counter store and mutated only
//! through its atomic conditional increment; these types are the shared
//! vocabulary between the store and the decision engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decision::DenialReason;

/// Key addressing one (store, campaign, visitor) counter set.
///
/// `tracking_key` is the campaign or experiment identifier the storefront
/// fires with; it keys the counters, not the database campaign id. The
/// session id rides along so session-scoped fields can roll over when it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub store_id: String,
    pub tracking_key: String,
    pub visitor_id: String,
    pub session_id: String,
}

impl CounterKey {
    pub fn new(
        store_id: impl Into<String>,
        tracking_key: impl Into<String>,
        visitor_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            store_id: store_id.into(),
            tracking_key: tracking_key.into(),
            visitor_id: visitor_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Point-in-time view of one counter set, windows already applied.
///
/// A missing counter reads as all zeros. `day_count` covers the current
/// UTC calendar day; `session_count` covers the current session id within
/// its inactivity timeout; `global_session_count` is the visitor's display
/// total across all campaigns for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub session_count: u32,
    pub day_count: u32,
    pub lifetime_count: u32,
    pub global_session_count: u32,
    pub last_displayed_at: Option<DateTime<Utc>>,
}

/// Result of the store's atomic check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// All caps passed; counters after the increment.
    Allowed(CounterSnapshot),
    /// A cap failed; nothing was incremented.
    Denied(DenialReason),
}

impl IncrementOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Self::Denied(reason) => Some(*reason),
            Self::Allowed(_) => None,
        }
    }
}
