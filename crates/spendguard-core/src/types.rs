//! Shared type definitions used across the SpendGuard audit crates.

use chrono::{DateTime, Duration, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuditError, Result};

/// Naive timestamp layouts accepted in addition to RFC 3339; read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts a trailing `Z`, an explicit offset (converted to UTC), or no offset
/// at all, in which case the timestamp is taken to already be UTC.
pub fn parse_iso_utc(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(AuditError::invalid_timestamp(
        input,
        "expected ISO-8601 such as 2026-02-10T01:02:03Z",
    ))
}

/// Format a UTC instant the way the guard stores `created_at`.
///
/// Whole seconds print as `2026-02-10T01:02:03+00:00`; anything else prints
/// exactly six fractional digits, truncated to the microsecond. Bounds are
/// compared with stored timestamps as strings, so the layout must match.
pub fn format_iso_utc(instant: &DateTime<Utc>) -> String {
    let micros = (instant.nanosecond() % 1_000_000_000) / 1_000;
    if micros == 0 {
        instant.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
    } else {
        instant.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
    }
}

/// Default window length when only the end is known.
pub fn default_span() -> Duration {
    Duration::hours(1)
}

/// Inclusive UTC time range over which ledger and provider totals are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationWindow {
    /// First instant included in the window
    pub start: DateTime<Utc>,

    /// Last instant included in the window
    pub end: DateTime<Utc>,
}

impl ReconciliationWindow {
    /// Create a window, rejecting `start > end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(AuditError::InvalidWindow {
                start: format_iso_utc(&start),
                end: format_iso_utc(&end),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both bounds from ISO-8601 strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_iso_utc(start)?, parse_iso_utc(end)?)
    }

    /// Resolve optional CLI bounds: `end` defaults to `now`, `start` to one
    /// hour before `end`.
    pub fn resolve(start: Option<&str>, end: Option<&str>, now: DateTime<Utc>) -> Result<Self> {
        let end = match end {
            Some(text) => parse_iso_utc(text)?,
            None => now,
        };
        let start = match start {
            Some(text) => parse_iso_utc(text)?,
            None => end - default_span(),
        };
        Self::new(start, end)
    }

    /// Start bound in the ledger's string format.
    pub fn start_iso(&self) -> String {
        format_iso_utc(&self.start)
    }

    /// End bound in the ledger's string format.
    pub fn end_iso(&self) -> String {
        format_iso_utc(&self.end)
    }
}

impl std::fmt::Display for ReconciliationWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start_iso(), self.end_iso())
    }
}
