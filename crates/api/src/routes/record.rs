//! Display record endpoint.
//!
//! The sole write entry point, shared by the storefront app proxy and the
//! authenticated analytics route in the admin app. The response tells the
//! storefront whether to render; a denied display costs one round trip and
//! nothing else.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use validator::Validate;

use frequency_engine::DisplayRequest;
use telemetry::metrics;

use crate::extractors::{ClientIp, RequestUserAgent};
use crate::response::{ApiError, RecordResponse};
use crate::state::AppState;

/// POST /storefront/impressions request body.
///
/// Identifier fields default to empty and are rejected by the engine with
/// coded input errors, so a missing `trackingKey` produces `INPUT_001`
/// rather than a serde rejection.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPayload {
    #[validate(length(max = 128))]
    pub tracking_key: String,
    #[validate(length(max = 128))]
    pub store_id: String,
    pub campaign_id: Option<String>,
    pub experiment_id: Option<String>,
    #[validate(length(max = 128))]
    pub visitor_id: String,
    #[validate(length(max = 128))]
    pub session_id: String,
    #[validate(length(max = 2048))]
    pub page_url: String,
    #[validate(length(max = 2048))]
    pub referrer: Option<String>,
    /// Forwarded by server-to-server callers; storefront calls rely on the
    /// User-Agent header instead.
    #[validate(length(max = 512))]
    pub user_agent: Option<String>,
    /// Forwarded by server-to-server callers.
    #[validate(length(max = 45))]
    pub ip_address: Option<String>,
    pub device_type: Option<String>,
    pub metadata: Option<Value>,
    /// Campaign frequency rules: either the whole `targetRules` document
    /// or just its `frequency_capping` block.
    pub frequency_rules: Option<Value>,
    /// Store `settings` document or its `frequencyCapping` block.
    pub store_settings: Option<Value>,
    pub template_type: Option<String>,
}

/// Accept both the full document and the bare capping block, so the two
/// caller populations (admin app forwards documents, storefront SDK sends
/// the block it was configured with) hit the same resolver path.
pub(crate) fn normalize_rules(raw: Value) -> Value {
    if raw.get("enhancedTriggers").is_some() {
        raw
    } else {
        serde_json::json!({ "enhancedTriggers": { "frequency_capping": raw } })
    }
}

pub(crate) fn normalize_settings(raw: Value) -> Value {
    if raw.get("frequencyCapping").is_some() {
        raw
    } else {
        serde_json::json!({ "frequencyCapping": raw })
    }
}

/// POST /storefront/impressions - Record one popup display.
pub async fn record_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    RequestUserAgent(header_ua): RequestUserAgent,
    Json(payload): Json<RecordPayload>,
) -> Result<Json<RecordResponse>, ApiError> {
    if !state.throttle.check(client_ip.as_deref()) {
        metrics().throttled_requests.inc();
        return Err(ApiError::throttled("Too many requests", Some(1)));
    }

    if let Err(e) = payload.validate() {
        return Err(ApiError::validation(
            "INPUT_003",
            e.to_string().lines().map(String::from).collect(),
        ));
    }

    debug!(
        tracking_key = %payload.tracking_key,
        store_id = %payload.store_id,
        "Received display record"
    );

    // Inline rules win; otherwise ask the admin app (cached 30s).
    let (target_rules, store_settings, template_type) =
        if payload.frequency_rules.is_some() || payload.store_settings.is_some() {
            (
                payload.frequency_rules.clone().map(normalize_rules),
                payload.store_settings.clone().map(normalize_settings),
                payload.template_type.clone(),
            )
        } else if !payload.tracking_key.is_empty() && !payload.store_id.is_empty() {
            let config = state
                .campaign_configs
                .fetch(&payload.store_id, &payload.tracking_key)
                .await;
            (
                config.target_rules,
                config.store_settings,
                config.template_type.or_else(|| payload.template_type.clone()),
            )
        } else {
            (None, None, payload.template_type.clone())
        };

    let request = DisplayRequest {
        store_id: payload.store_id,
        tracking_key: payload.tracking_key,
        campaign_id: payload.campaign_id,
        experiment_id: payload.experiment_id,
        visitor_id: payload.visitor_id,
        session_id: payload.session_id,
        page_url: payload.page_url,
        referrer: payload.referrer,
        user_agent: payload.user_agent.or(header_ua),
        ip_address: payload.ip_address.or(client_ip),
        device_type: payload.device_type,
        metadata: payload.metadata,
        target_rules,
        store_settings,
        template_type,
    };

    let outcome = state.service.record_display(request).await.map_err(|e| {
        warn!(error = %e, "Display record rejected");
        ApiError::from(e)
    })?;

    Ok(Json(RecordResponse::from(outcome)))
}
