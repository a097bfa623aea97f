//! Buffered sink configuration.

use serde::{Deserialize, Serialize};

use cap_core::limits::SINK_MAX_FLUSH_ATTEMPTS;

/// Buffered sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Rows per batch before an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum batch age in milliseconds before the background flush
    #[serde(default = "default_batch_age_ms")]
    pub batch_age_ms: u64,
    /// Bounded attempts per batch; the batch is dropped afterwards
    #[serde(default = "default_flush_attempts")]
    pub flush_attempts: u32,
    /// Delay between attempts in milliseconds (grows linearly per attempt)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_batch_size() -> usize {
    200
}

fn default_batch_age_ms() -> u64 {
    1000
}

fn default_flush_attempts() -> u32 {
    SINK_MAX_FLUSH_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    250
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_age_ms: default_batch_age_ms(),
            flush_attempts: default_flush_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}
