//! Decision-only endpoint.
//!
//! Lets the storefront ask "may this campaign display" without consuming a
//! display slot; the slot is consumed by the later record call, so a
//! client-side abort between the two costs nothing.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use cap_core::error::InputErrorCode;
use frequency_engine::DisplayRequest;
use telemetry::metrics;

use crate::extractors::ClientIp;
use crate::response::{ApiError, DecisionResponse};
use crate::state::AppState;

/// POST /storefront/decisions request body.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionPayload {
    #[validate(length(max = 128))]
    pub tracking_key: String,
    #[validate(length(max = 128))]
    pub store_id: String,
    #[validate(length(max = 128))]
    pub visitor_id: String,
    #[validate(length(max = 128))]
    pub session_id: String,
    pub frequency_rules: Option<Value>,
    pub store_settings: Option<Value>,
    pub template_type: Option<String>,
}

/// POST /storefront/decisions - Evaluate caps without consuming a slot.
pub async fn decide_handler(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
    Json(payload): Json<DecisionPayload>,
) -> Result<Json<DecisionResponse>, ApiError> {
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

    if payload.tracking_key.trim().is_empty() {
        return Err(cap_core::Error::input(
            InputErrorCode::MissingTrackingKey,
            "tracking key is required",
        )
        .into());
    }
    if payload.visitor_id.trim().is_empty() {
        return Err(cap_core::Error::input(
            InputErrorCode::MissingVisitor,
            "visitor id is required",
        )
        .into());
    }

    // Same resolution path as the record call.
    let (target_rules, store_settings, template_type) =
        if payload.frequency_rules.is_some() || payload.store_settings.is_some() {
            (
                payload.frequency_rules.clone().map(super::record::normalize_rules),
                payload.store_settings.clone().map(super::record::normalize_settings),
                payload.template_type.clone(),
            )
        } else if !payload.store_id.is_empty() {
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

    let probe = DisplayRequest {
        store_id: payload.store_id.clone(),
        tracking_key: payload.tracking_key.clone(),
        visitor_id: payload.visitor_id.clone(),
        session_id: payload.session_id.clone(),
        target_rules,
        store_settings,
        template_type,
        ..Default::default()
    };
    let policy = state.service.resolve_policy(&probe);

    let decision = state
        .service
        .decide(
            &payload.store_id,
            &payload.tracking_key,
            &payload.visitor_id,
            &payload.session_id,
            &policy,
        )
        .await;

    Ok(Json(DecisionResponse::from(decision)))
}
