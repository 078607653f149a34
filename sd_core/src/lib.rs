//! ABOUTME: Shared error type, row ids, dates and tracing setup
//! ABOUTME: Foundation crate used by all other seatdesk components

pub mod error;
pub mod id;
pub mod telemetry;
pub mod time;

pub use error::{Error, Result};
pub use id::Id;
pub use time::{current_month, now_iso8601, today, MonotonicTimer};
