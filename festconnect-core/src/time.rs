//! Timestamp utilities

use chrono::{DateTime, Datelike, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Calendar year of the current UTC date
pub fn current_year() -> i32 {
    now().year()
}

/// Parse an RFC 3339 timestamp as written by the legacy store
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
