//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use cap_core::{DenialReason, DisplayDecision, RecordOutcome};

/// Response for a display record call.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecordResponse {
    /// recorded | rejected | degraded
    pub outcome: String,
    /// Whether the storefront should show the popup.
    pub displayed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    pub timestamp: i64,
}

impl From<RecordOutcome> for RecordResponse {
    fn from(outcome: RecordOutcome) -> Self {
        Self {
            outcome: outcome.as_str().to_string(),
            displayed: outcome.is_displayed(),
            reason: outcome.denial(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Response for a decision-only call.
#[derive(Debug, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    pub timestamp: i64,
}

impl From<DisplayDecision> for DecisionResponse {
    fn from(decision: DisplayDecision) -> Self {
        Self {
            allowed: decision.allowed,
            reason: decision.reason,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub counter_store_connected: bool,
    pub clickhouse_connected: bool,
    pub pending_impressions: u64,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error type with engine error codes.
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
    pub retry_after: Option<u64>,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
            retry_after: None,
        }
    }

    pub fn bad_request(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, code, msg)
    }

    pub fn throttled(msg: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            response: ErrorResponse::new(msg, "RATE_001"),
            retry_after,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", msg)
    }

    pub fn validation(code: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            response: ErrorResponse::new("Validation failed", code).with_details(errors),
            retry_after: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.response)).into_response();

        // Add Retry-After header for throttled responses
        if let Some(retry_after) = self.retry_after {
            if let Ok(value) = retry_after.to_string().parse() {
                response.headers_mut().insert("Retry-After", value);
            }
        }

        response
    }
}

impl From<cap_core::Error> for ApiError {
    fn from(err: cap_core::Error) -> Self {
        match &err {
            cap_core::Error::Input { code, message, http_status } => {
                let status = StatusCode::from_u16(*http_status).unwrap_or(StatusCode::BAD_REQUEST);
                ApiError::with_code(status, *code, message)
            }
            cap_core::Error::Throttled { message, retry_after, .. } => {
                ApiError::throttled(message, *retry_after)
            }
            // Policy/store/sink errors are recovered inside the engine;
            // one reaching this boundary is a bug worth a 500.
            _ => ApiError::internal(err.to_string()),
        }
    }
}
