//! Durable impression sink for the frequency-capping engine.
//!
//! Impressions are append-only analytics records, independent of the
//! counter store: losing one must never block or roll back a display
//! decision. The ClickHouse sink buffers rows in-process and flushes them
//! in the background with bounded retries.

pub mod batch;
pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;
pub mod sink;

pub use client::{ClickHouseClient, ClickHouseConfig};
pub use config::SinkConfig;
pub use sink::{ClickHouseSink, EventSink, SharedEventSink};
