// ABOUTME: Utilities for working with timestamps, calendar dates and billing months.
// ABOUTME: Provides RFC3339 formatting, YYYY-MM / YYYY-MM-DD validation and monotonic timers.
use crate::{Error, Result};
use ::time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    Time,
};
use std::time::{Duration, Instant, SystemTime};

/// Get the current system time
pub fn utc_now() -> SystemTime {
    SystemTime::now()
}

/// Convert a SystemTime to an RFC3339 timestamp string
///
/// # Examples
///
/// ```
/// use sd_core::time::to_rfc3339;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let time = UNIX_EPOCH + Duration::from_secs(1_609_459_200); // 2021-01-01
/// assert_eq!(to_rfc3339(time), "2021-01-01T00:00:00Z");
/// ```
pub fn to_rfc3339(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Get current time as an RFC3339 formatted string
pub fn now_iso8601() -> String {
    to_rfc3339(utc_now())
}

/// Today's UTC date as `YYYY-MM-DD`
pub fn today() -> String {
    let date = OffsetDateTime::now_utc().date();
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

/// The current UTC billing month as `YYYY-MM`
pub fn current_month() -> String {
    let date = OffsetDateTime::now_utc().date();
    date.format(format_description!("[year]-[month]"))
        .unwrap_or_default()
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Result<Date> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|_| Error::Validation(format!("'{}' is not a valid YYYY-MM-DD date", value)))
}

/// Validate a `YYYY-MM` billing month, returning it unchanged
///
/// # Examples
///
/// ```
/// use sd_core::time::validate_month;
/// assert!(validate_month("2024-02").is_ok());
/// assert!(validate_month("2024-13").is_err());
/// assert!(validate_month("2024-2").is_err());
/// ```
pub fn validate_month(value: &str) -> Result<&str> {
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 7
        && bytes[4] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || b.is_ascii_digit());

    if !well_formed || parse_date(&format!("{}-01", value)).is_err() {
        return Err(Error::Validation(format!(
            "'{}' is not a valid YYYY-MM month",
            value
        )));
    }

    Ok(value)
}

/// Billing month (`YYYY-MM`) a `YYYY-MM-DD` date falls in
pub fn month_of(date: &str) -> Result<String> {
    parse_date(date)?;
    Ok(date[..7].to_string())
}

/// Parse an `HH:MM` wall-clock time
pub fn parse_hhmm(value: &str) -> Result<Time> {
    Time::parse(value, format_description!("[hour]:[minute]"))
        .map_err(|_| Error::Validation(format!("'{}' is not a valid HH:MM time", value)))
}

/// Create a monotonic duration measurer
pub struct MonotonicTimer {
    start: Instant,
}

impl MonotonicTimer {
    /// Create a new timer starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time since creation
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for MonotonicTimer {
    fn default() -> Self {
        Self::new()
    }
}
