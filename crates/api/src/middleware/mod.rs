//! Request middleware.

pub mod throttle;
