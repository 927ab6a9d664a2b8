//! RFC 3339 timestamp decoding shared by the row types

use chrono::{DateTime, Utc};

/// Parse an RFC 3339 timestamp, falling back to now on malformed data
pub(crate) fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Parse an optional RFC 3339 timestamp
pub(crate) fn parse_optional_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
