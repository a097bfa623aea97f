//! Read helpers for verification and tooling.

use crate::client::ClickHouseClient;
use crate::insert::ImpressionRow;
use cap_core::Result;

/// Count all impression rows.
pub async fn count_impressions(client: &ClickHouseClient) -> Result<u64> {
    client
        .inner()
        .query("SELECT count() FROM marquee.impressions")
        .fetch_one::<u64>()
        .await
        .map_err(|e| cap_core::Error::internal(format!("Count query failed: {}", e)))
}

/// Fetch the most recent impression rows.
pub async fn fetch_recent(client: &ClickHouseClient, limit: usize) -> Result<Vec<ImpressionRow>> {
    client
        .inner()
        .query("SELECT * FROM marquee.impressions ORDER BY created_at DESC LIMIT ?")
        .bind(limit as u64)
        .fetch_all::<ImpressionRow>()
        .await
        .map_err(|e| cap_core::Error::internal(format!("Fetch query failed: {}", e)))
}

/// Remove all impression rows. Test helper.
pub async fn truncate_impressions(client: &ClickHouseClient) -> Result<()> {
    client
        .inner()
        .query("TRUNCATE TABLE marquee.impressions")
        .execute()
        .await
        .map_err(|e| cap_core::Error::internal(format!("Truncate failed: {}", e)))
}
