//! Counter store configuration.

use serde::{Deserialize, Serialize};

use cap_core::limits::{COUNTER_RETENTION_HOURS, SESSION_TIMEOUT_MINUTES};

/// In-memory counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Shard count; rounded up to a power of two.
    #[serde(default = "default_shards")]
    pub shards: usize,
    /// Stale-entry sweep interval in seconds.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Session inactivity timeout in minutes.
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: i64,
    /// Idle retention for visitor entries in hours.
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
}

fn default_shards() -> usize {
    64
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_session_timeout_minutes() -> i64 {
    SESSION_TIMEOUT_MINUTES
}

fn default_retention_hours() -> i64 {
    COUNTER_RETENTION_HOURS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            session_timeout_minutes: default_session_timeout_minutes(),
            retention_hours: default_retention_hours(),
        }
    }
}
