//! Internal telemetry for the Marquee frequency-capping engine.
//!
//! Metrics are collected in-memory and periodically flushed to ClickHouse
//! alongside the impressions they describe.

pub mod health;
pub mod metrics;
pub mod tracing_setup;

pub use health::*;
pub use metrics::*;
pub use tracing_setup::*;
