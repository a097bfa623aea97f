//! Display decision and impression recording.
//!
//! [`FrequencyCapService`] is the sole public entry point the API layer
//! calls: it resolves the effective policy, consults the counter store, and
//! hands accepted displays to the durable sink. Degraded dependencies never
//! surface as errors; the storefront fails open.

pub mod bot;
pub mod config;
pub mod service;

pub use bot::BotFilter;
pub use config::EngineConfig;
pub use service::{DisplayRequest, FrequencyCapService};
