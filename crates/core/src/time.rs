//! Timestamp formatting for persisted TEXT columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 (microsecond precision,
//! `Z` suffix) so that lexicographic ordering of the column equals
//! chronological ordering. `DateTime::to_rfc3339` alone is variable-width
//! and would break `ORDER BY` on the text column.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}
