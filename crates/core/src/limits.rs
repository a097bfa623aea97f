//! Timing and size limits for the frequency-capping engine.
//!
//! The decision path sits on the storefront's critical rendering path, so
//! every blocking operation here carries a short deadline. Size limits cap
//! what untrusted storefront payloads can make the engine hold in memory.
//!
//! # Usage Note
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so field limits are duplicated there. Keep both in sync when modifying.

// === Decision path deadlines ===

/// Counter store call deadline in milliseconds.
///
/// Sub-200ms target for the whole decision path; the store gets most of it.
/// A store that misses this deadline is treated as unavailable (fail-open).
pub const STORE_TIMEOUT_MS: u64 = 150;

// === Counter windows ===

/// Session inactivity timeout (30 minutes).
///
/// Session-scoped counters reset when the session id changes or when this
/// much time passes without a display for the pair.
pub const SESSION_TIMEOUT_MINUTES: i64 = 30;

/// Idle retention for counter entries (48 hours).
///
/// Entries untouched for this long are swept by the cleanup task. Lifetime
/// counts for a returning visitor restart from zero after the sweep; the
/// durable impression log remains the source of truth for analytics.
pub const COUNTER_RETENTION_HOURS: i64 = 48;

// === Bot velocity heuristics ===

/// Sliding window for event-velocity tracking (seconds).
pub const VELOCITY_WINDOW_SECS: u64 = 10;

/// Displays within one velocity window that mark a visitor as implausible.
///
/// A human cannot trigger 20 popup displays in 10 seconds; duplicate
/// trigger firings top out well below this.
pub const VELOCITY_MAX_EVENTS: u32 = 20;

// === String field limits (chars) ===

/// Tracking key max length (campaign or experiment identifier).
pub const MAX_TRACKING_KEY_LEN: usize = 128;

/// Visitor ID max length.
pub const MAX_VISITOR_ID_LEN: usize = 128;

/// Session ID max length.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Page URL max length.
pub const MAX_PAGE_URL_LEN: usize = 2048;

/// Referrer URL max length. Matches the HTTP Referer header limit.
pub const MAX_REFERRER_LEN: usize = 2048;

/// User agent string max length.
/// Browser UAs: 100-300 typical, 500+ with extensions.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// IP address max length (IPv6 = 45 chars).
pub const MAX_IP_LEN: usize = 45;

// === Metadata limits ===

/// Maximum metadata JSON size in bytes (16KB).
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

// === Durable sink ===

/// Bounded retry attempts for a failed impression batch flush.
///
/// Retries happen asynchronously in the flush task, never inside a
/// caller's request. After the last attempt the batch is dropped and
/// counted in `impression_write_errors`.
pub const SINK_MAX_FLUSH_ATTEMPTS: u32 = 3;
