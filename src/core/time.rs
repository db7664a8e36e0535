//! Shared timestamp/id helpers for deterministic log lines and envelopes.

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use ulid::Ulid;

/// Canonical log timestamp: `YYYY-MM-DD HH:MM:SS UTC`.
pub fn log_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Current wall clock in the canonical log format.
pub fn now_log_stamp() -> String {
    log_stamp(Utc::now())
}

/// RFC 3339 seconds-precision timestamp for database rows.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn new_rotation_id() -> String {
    Ulid::new().to_string()
}

pub fn new_request_id() -> String {
    Ulid::new().to_string()
}

/// Parse a canonical log timestamp back to UTC; used by bulk staggering and
/// recency queries.
pub fn parse_log_stamp(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.strip_suffix(" UTC")?;
    let naive = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
