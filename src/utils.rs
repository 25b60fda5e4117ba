//! Small shared helpers.

use chrono::{DateTime, Utc};

/// Formats a DateTime to SCIM 2.0 compliant XSD dateTime format
/// (RFC 7644 §3.3.7), e.g. "2025-06-14T10:03:54.374Z".
pub fn format_scim_datetime(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Truncate a string to at most `max_chars` characters, respecting char
/// boundaries. Used for the column width limits in §3 (`last_error` ≤
/// 2000, `stdout`/`stderr`/`parameters` ≤ 65535).
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}
