//! Durable impression event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::limits::MAX_METADATA_BYTES;

/// Impression event kind. Only views flow through the capping engine;
/// clicks and conversions are recorded by the admin app's analytics route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    View,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "VIEW",
        }
    }
}

/// One durable, append-only impression record.
///
/// Written once per accepted display, independent of the counter store.
/// Its loss never blocks the decision path: writes are fire-and-forget,
/// logged on failure, never rolled back.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ImpressionEvent {
    /// Unique event ID
    pub id: Uuid,
    /// Shop this impression belongs to
    pub store_id: String,
    /// Campaign that displayed
    pub campaign_id: String,
    /// A/B experiment arm, when the display came from an experiment
    pub experiment_id: Option<String>,
    /// Anonymous visitor identifier
    pub visitor_id: String,
    /// Storefront session identifier
    pub session_id: String,
    /// Event kind
    pub event_type: EventType,
    /// Page the popup displayed on
    #[validate(length(max = 2048))]
    pub page_url: String,
    /// Referrer URL
    #[validate(length(max = 2048))]
    pub referrer: Option<String>,
    /// Visitor user agent
    #[validate(length(max = 512))]
    pub user_agent: Option<String>,
    /// Client IP (set by the server from forwarding headers)
    #[validate(length(max = 45))]
    pub ip_address: Option<String>,
    /// desktop / mobile / tablet / bot / unknown
    pub device_type: String,
    /// Set by the bot filter; flagged events are kept, never dropped
    pub suspected_bot: bool,
    /// Arbitrary campaign metadata (max 16KB)
    pub metadata: Option<serde_json::Value>,
    /// Server receive timestamp
    pub created_at: DateTime<Utc>,
}

impl ImpressionEvent {
    /// Creates a view event with a generated ID and the current timestamp.
    pub fn view(
        store_id: impl Into<String>,
        campaign_id: impl Into<String>,
        visitor_id: impl Into<String>,
        session_id: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id: store_id.into(),
            campaign_id: campaign_id.into(),
            experiment_id: None,
            visitor_id: visitor_id.into(),
            session_id: session_id.into(),
            event_type: EventType::View,
            page_url: page_url.into(),
            referrer: None,
            user_agent: None,
            ip_address: None,
            device_type: "unknown".to_string(),
            suspected_bot: false,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Serialized metadata, truncation-checked.
    ///
    /// Oversized metadata is replaced with an empty object rather than
    /// rejected; the impression itself must survive.
    pub fn metadata_json(&self) -> String {
        match &self.metadata {
            None => "{}".to_string(),
            Some(value) => {
                let serialized = value.to_string();
                if serialized.len() > MAX_METADATA_BYTES {
                    "{}".to_string()
                } else {
                    serialized
                }
            }
        }
    }
}
