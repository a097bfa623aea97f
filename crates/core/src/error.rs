//! Unified error types for the frequency-capping engine.
//!
//! Error codes:
//! - INPUT_001-003: Caller input errors (the only class surfaced as a failure)
//! - POLICY_001: Malformed frequency-capping configuration
//! - STORE_001-002: Counter store errors
//! - EVENT_001: Durable impression write errors
//! - RATE_001: Request throttle errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Caller input error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputErrorCode {
    /// INPUT_001: Tracking key is required
    MissingTrackingKey,
    /// INPUT_002: Visitor ID is required
    MissingVisitor,
    /// INPUT_003: Payload failed validation
    InvalidPayload,
}

impl InputErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingTrackingKey => "INPUT_001",
            Self::MissingVisitor => "INPUT_002",
            Self::InvalidPayload => "INPUT_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Policy configuration error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyErrorCode {
    /// POLICY_001: Frequency-capping JSON could not be parsed
    Malformed,
}

impl PolicyErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Malformed => "POLICY_001",
        }
    }
}

/// Counter store error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// STORE_001: Counter store unavailable
    Unavailable,
    /// STORE_002: Counter store call exceeded its deadline
    Timeout,
}

impl StoreErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "STORE_001",
            Self::Timeout => "STORE_002",
        }
    }
}

/// Durable event sink error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkErrorCode {
    /// EVENT_001: Failed to write impression event
    WriteFailed,
}

impl SinkErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::WriteFailed => "EVENT_001",
        }
    }
}

/// Request throttle error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleErrorCode {
    /// RATE_001: Too many requests from this client
    Exceeded,
}

impl ThrottleErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Exceeded => "RATE_001",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        429
    }
}

/// Unified error type for the frequency-capping engine.
///
/// Only `Input` and `Throttled` ever reach a caller; policy, store, and
/// sink errors are recovered inside the engine (conservative default,
/// fail-open, log-and-continue respectively).
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input error with code.
    #[error("[{code}] {message}")]
    Input {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Malformed frequency-capping configuration.
    #[error("[{code}] {message}")]
    Policy {
        code: &'static str,
        message: String,
    },

    /// Counter store error.
    #[error("[{code}] {message}")]
    Store {
        code: &'static str,
        message: String,
    },

    /// Durable event sink error.
    #[error("[{code}] {message}")]
    Sink {
        code: &'static str,
        message: String,
    },

    /// Request throttle error.
    #[error("[{code}] {message}")]
    Throttled {
        code: &'static str,
        message: String,
        retry_after: Option<u64>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a caller input error.
    pub fn input(code: InputErrorCode, msg: impl Into<String>) -> Self {
        Self::Input {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a malformed-policy error.
    pub fn policy_malformed(msg: impl Into<String>) -> Self {
        Self::Policy {
            code: PolicyErrorCode::Malformed.code(),
            message: msg.into(),
        }
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::Store {
            code: StoreErrorCode::Unavailable.code(),
            message: msg.into(),
        }
    }

    /// Create a store-timeout error.
    pub fn store_timeout(msg: impl Into<String>) -> Self {
        Self::Store {
            code: StoreErrorCode::Timeout.code(),
            message: msg.into(),
        }
    }

    /// Create a sink write error.
    pub fn sink_write(msg: impl Into<String>) -> Self {
        Self::Sink {
            code: SinkErrorCode::WriteFailed.code(),
            message: msg.into(),
        }
    }

    /// Create a throttle error.
    pub fn throttled(msg: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::Throttled {
            code: ThrottleErrorCode::Exceeded.code(),
            message: msg.into(),
            retry_after,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Input { http_status, .. } => *http_status,
            Self::Policy { .. } => 500,
            Self::Store { .. } => 503,
            Self::Sink { .. } => 500,
            Self::Throttled { .. } => 429,
            Self::Serialization(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Input { code, .. } => Some(code),
            Self::Policy { code, .. } => Some(code),
            Self::Store { code, .. } => Some(code),
            Self::Sink { code, .. } => Some(code),
            Self::Throttled { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Whether the engine recovers from this error without failing the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Policy { .. } | Self::Store { .. } | Self::Sink { .. })
    }
}
