//! ClickHouse table schemas.
//!
//! Impressions are append-only with:
//! - LowCardinality for enum-like fields
//! - DateTime64(3) for millisecond precision
//! - a JSON metadata blob for extensibility

/// SQL for creating the database.
pub const CREATE_DATABASE: &str = "CREATE DATABASE IF NOT EXISTS marquee";

/// SQL for creating the impressions table.
///
/// One row per accepted display. `suspected_bot` rows are kept for
/// auditability and excluded from merchant-facing aggregates at query time.
pub const CREATE_IMPRESSIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS marquee.impressions (
    -- Core identifiers
    id String,
    store_id String,
    campaign_id String,
    experiment_id Nullable(String),
    visitor_id String,
    session_id String,

    -- Event classification
    event_type LowCardinality(String),

    -- Page context
    page_url String,
    referrer String,

    -- Client information
    user_agent String,
    ip_address String,
    device_type LowCardinality(String),
    suspected_bot UInt8,

    -- Extensible JSON blob for campaign-specific fields
    metadata String,

    -- Timestamps
    created_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(created_at)
ORDER BY (store_id, campaign_id, created_at)
TTL toDateTime(created_at) + INTERVAL 90 DAY
SETTINGS index_granularity = 8192
"#;

/// SQL for creating the internal metrics table.
pub const CREATE_INTERNAL_METRICS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS marquee.internal_metrics (
    timestamp DateTime64(3),
    displays_requested UInt64,
    displays_recorded UInt64,
    displays_rejected UInt64,
    displays_degraded UInt64,
    decisions_requested UInt64,
    decisions_denied UInt64,
    policy_fallbacks UInt64,
    bot_screened UInt64,
    bot_flagged UInt64,
    store_errors UInt64,
    store_timeouts UInt64,
    impressions_written UInt64,
    impression_write_errors UInt64,
    throttled_requests UInt64,
    record_latency_mean_ms Float64,
    store_latency_mean_ms Float64,
    sink_flush_latency_mean_ms Float64,
    counter_entries UInt64,
    pending_impressions UInt64
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(timestamp)
ORDER BY timestamp
TTL toDateTime(timestamp) + INTERVAL 30 DAY
"#;

/// All DDL statements in creation order.
pub fn all_tables() -> Vec<&'static str> {
    vec![
        CREATE_DATABASE,
        CREATE_IMPRESSIONS_TABLE,
        CREATE_INTERNAL_METRICS_TABLE,
    ]
}
