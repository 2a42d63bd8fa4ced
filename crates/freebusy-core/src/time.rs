//! Time types for free/busy queries.
//!
//! This module provides [`TimeWindow`] for defining query ranges and
//! [`parse_timestamp`] for turning form input into UTC instants.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Formats accepted for timestamps without an explicit offset.
///
/// These are what an HTML `datetime-local` input submits; they are read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Errors produced while parsing or validating times.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The input could not be read as a timestamp.
    #[error("invalid timestamp '{input}': expected RFC 3339, YYYY-MM-DDTHH:MM or YYYY-MM-DD")]
    InvalidTimestamp { input: String },

    /// The window ends at or before its start.
    #[error("end time {end} must be after start time {start}")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Parses a user-supplied timestamp into a UTC instant.
///
/// Accepts, in order:
/// - RFC 3339 with offset (`2024-01-01T09:00:00Z`, `2024-01-01T10:00:00+01:00`)
/// - `datetime-local` style without offset (`2024-01-01T09:00`), read as UTC
/// - a bare date (`2024-01-01`), read as midnight UTC
pub fn parse_timestamp(input: &str) -> Result<DateTime<Utc>, TimeError> {
    let trimmed = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    Err(TimeError::InvalidTimestamp {
        input: input.to_string(),
    })
}

/// A time window for querying busy intervals.
///
/// The window is half-open: `start` is inclusive, `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeError> {
        if end <= start {
            return Err(TimeError::EmptyWindow { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses both bounds from user input and builds the window.
    pub fn parse(start: &str, end: &str) -> Result<Self, TimeError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    /// Start bound formatted for the upstream API.
    pub fn start_rfc3339(&self) -> String {
        self.start.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }

    /// End bound formatted for the upstream API.
    pub fn end_rfc3339(&self) -> String {
        self.end.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}
