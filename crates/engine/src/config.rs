//! Engine configuration.

use serde::{Deserialize, Serialize};

use cap_core::limits::{STORE_TIMEOUT_MS, VELOCITY_MAX_EVENTS, VELOCITY_WINDOW_SECS};

/// Decision/record path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Counter store deadline in milliseconds; misses fail open.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Whether UA-identified bots skip the counter increment.
    #[serde(default = "default_exclude_bots_from_caps")]
    pub exclude_bots_from_caps: bool,
    /// Sliding window for event-velocity tracking, in seconds.
    #[serde(default = "default_velocity_window_secs")]
    pub velocity_window_secs: u64,
    /// Displays within one window that flag a visitor as implausible.
    #[serde(default = "default_velocity_max_events")]
    pub velocity_max_events: u32,
}

fn default_store_timeout_ms() -> u64 {
    STORE_TIMEOUT_MS
}

fn default_exclude_bots_from_caps() -> bool {
    true
}

fn default_velocity_window_secs() -> u64 {
    VELOCITY_WINDOW_SECS
}

fn default_velocity_max_events() -> u32 {
    VELOCITY_MAX_EVENTS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            exclude_bots_from_caps: default_exclude_bots_from_caps(),
            velocity_window_secs: default_velocity_window_secs(),
            velocity_max_events: default_velocity_max_events(),
        }
    }
}
