//! Batch insert helpers for ClickHouse.

use crate::client::ClickHouseClient;
use cap_core::{ImpressionEvent, Result};
use clickhouse::Row;
use serde::{Deserialize, Serialize};
use telemetry::{metrics, MetricsSnapshot};
use tracing::debug;

/// Flattened impression row for ClickHouse insertion.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ImpressionRow {
    pub id: String,
    pub store_id: String,
    pub campaign_id: String,
    pub experiment_id: Option<String>,
    pub visitor_id: String,
    pub session_id: String,
    pub event_type: String,
    pub page_url: String,
    pub referrer: String,
    pub user_agent: String,
    pub ip_address: String,
    pub device_type: String,
    pub suspected_bot: u8,
    pub metadata: String,
    pub created_at: i64, // milliseconds since epoch
}

impl From<ImpressionEvent> for ImpressionRow {
    fn from(event: ImpressionEvent) -> Self {
        let metadata = event.metadata_json();
        Self {
            id: event.id.to_string(),
            store_id: event.store_id,
            campaign_id: event.campaign_id,
            experiment_id: event.experiment_id,
            visitor_id: event.visitor_id,
            session_id: event.session_id,
            event_type: event.event_type.as_str().to_string(),
            page_url: event.page_url,
            referrer: event.referrer.unwrap_or_default(),
            user_agent: event.user_agent.unwrap_or_default(),
            ip_address: event.ip_address.unwrap_or_default(),
            device_type: event.device_type,
            suspected_bot: if event.suspected_bot { 1 } else { 0 },
            metadata,
            created_at: event.created_at.timestamp_millis(),
        }
    }
}

/// Insert impression rows.
pub async fn insert_impressions(
    client: &ClickHouseClient,
    events: Vec<ImpressionEvent>,
) -> Result<usize> {
    if events.is_empty() {
        return Ok(0);
    }

    let count = events.len();
    let start = std::time::Instant::now();

    let rows: Vec<ImpressionRow> = events.into_iter().map(ImpressionRow::from).collect();

    let mut insert = client
        .inner()
        .insert("marquee.impressions")
        .map_err(|e| cap_core::Error::sink_write(format!("Insert error: {}", e)))?;

    for row in &rows {
        insert
            .write(row)
            .await
            .map_err(|e| cap_core::Error::sink_write(format!("Write error: {}", e)))?;
    }

    insert
        .end()
        .await
        .map_err(|e| cap_core::Error::sink_write(format!("End error: {}", e)))?;

    let elapsed = start.elapsed();
    metrics().sink_flush_latency_ms.observe(elapsed.as_millis() as u64);
    metrics().impressions_written.inc_by(count as u64);

    debug!(
        count = count,
        latency_ms = %elapsed.as_millis(),
        "Inserted impressions to ClickHouse"
    );

    Ok(count)
}

/// Internal metrics row for ClickHouse.
#[derive(Debug, Clone, Row, Serialize)]
pub struct MetricsRow {
    pub timestamp: i64,
    pub displays_requested: u64,
    pub displays_recorded: u64,
    pub displays_rejected: u64,
    pub displays_degraded: u64,
    pub decisions_requested: u64,
    pub decisions_denied: u64,
    pub policy_fallbacks: u64,
    pub bot_screened: u64,
    pub bot_flagged: u64,
    pub store_errors: u64,
    pub store_timeouts: u64,
    pub impressions_written: u64,
    pub impression_write_errors: u64,
    pub throttled_requests: u64,
    pub record_latency_mean_ms: f64,
    pub store_latency_mean_ms: f64,
    pub sink_flush_latency_mean_ms: f64,
    pub counter_entries: u64,
    pub pending_impressions: u64,
}

impl From<MetricsSnapshot> for MetricsRow {
    fn from(snapshot: MetricsSnapshot) -> Self {
        Self {
            timestamp: snapshot.timestamp.timestamp_millis(),
            displays_requested: snapshot.displays_requested,
            displays_recorded: snapshot.displays_recorded,
            displays_rejected: snapshot.displays_rejected,
            displays_degraded: snapshot.displays_degraded,
            decisions_requested: snapshot.decisions_requested,
            decisions_denied: snapshot.decisions_denied,
            policy_fallbacks: snapshot.policy_fallbacks,
            bot_screened: snapshot.bot_screened,
            bot_flagged: snapshot.bot_flagged,
            store_errors: snapshot.store_errors,
            store_timeouts: snapshot.store_timeouts,
            impressions_written: snapshot.impressions_written,
            impression_write_errors: snapshot.impression_write_errors,
            throttled_requests: snapshot.throttled_requests,
            record_latency_mean_ms: snapshot.record_latency_mean_ms,
            store_latency_mean_ms: snapshot.store_latency_mean_ms,
            sink_flush_latency_mean_ms: snapshot.sink_flush_latency_mean_ms,
            counter_entries: snapshot.counter_entries,
            pending_impressions: snapshot.pending_impressions,
        }
    }
}

/// Insert an internal metrics snapshot.
pub async fn insert_metrics(client: &ClickHouseClient, snapshot: MetricsSnapshot) -> Result<()> {
    let row = MetricsRow::from(snapshot);

    let mut insert = client
        .inner()
        .insert("marquee.internal_metrics")
        .map_err(|e| cap_core::Error::internal(format!("Insert error: {}", e)))?;

    insert
        .write(&row)
        .await
        .map_err(|e| cap_core::Error::internal(format!("Write error: {}", e)))?;

    insert
        .end()
        .await
        .map_err(|e| cap_core::Error::internal(format!("End error: {}", e)))?;

    Ok(())
}
