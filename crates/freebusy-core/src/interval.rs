//! Busy intervals and the query that produces them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time::{TimeError, TimeWindow};

/// How busy-interval bounds are rendered for people.
const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// A single period during which a calendar is marked busy.
///
/// Serialized the way the Google Calendar API returns it:
/// `{"start": "2024-01-01T09:00:00Z", "end": "2024-01-01T10:00:00Z"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    /// When the busy period begins.
    pub start: DateTime<Utc>,
    /// When the busy period ends.
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    /// Creates a new busy interval.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for BusyInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} – {}",
            self.start.format(DISPLAY_FORMAT),
            self.end.format(DISPLAY_FORMAT)
        )
    }
}

/// Errors produced while building a [`FreeBusyQuery`] from user input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// No calendar identifier was supplied.
    #[error("calendar ID is required")]
    MissingCalendarId,

    /// A time bound was malformed or the range was empty.
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// A free/busy query for exactly one calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBusyQuery {
    /// The calendar to query (e.g. `team@example.com` or `primary`).
    pub calendar_id: String,
    /// The time range to query.
    pub window: TimeWindow,
}

impl FreeBusyQuery {
    /// Creates a query for the given calendar and window.
    pub fn new(calendar_id: impl Into<String>, window: TimeWindow) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            window,
        }
    }

    /// Builds a query from raw form fields.
    pub fn from_form(calendar_id: &str, start: &str, end: &str) -> Result<Self, QueryError> {
        let calendar_id = calendar_id.trim();
        if calendar_id.is_empty() {
            return Err(QueryError::MissingCalendarId);
        }
        let window = TimeWindow::parse(start, end)?;
        Ok(Self::new(calendar_id, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn interval_deserializes_from_api_shape() {
        let json = r#"{"start": "2024-01-01T09:00:00Z", "end": "2024-01-01T10:00:00Z"}"#;
        let interval: BusyInterval = serde_json::from_str(json).unwrap();
        assert_eq!(
            interval.start,
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()
        );
        assert_eq!(
            interval.end,
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn interval_display() {
        let interval = BusyInterval::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap(),
        );
        assert_eq!(
            interval.to_string(),
            "2024-01-01 09:00 UTC – 2024-01-01 10:00 UTC"
        );
    }

    #[test]
    fn query_from_form() {
        let query = FreeBusyQuery::from_form(
            " team@example.com ",
            "2024-01-01T00:00:00Z",
            "2024-01-02T00:00:00Z",
        )
        .unwrap();
        assert_eq!(query.calendar_id, "team@example.com");
        assert_eq!(query.window.start_rfc3339(), "2024-01-01T00:00:00Z");
        assert_eq!(query.window.end_rfc3339(), "2024-01-02T00:00:00Z");
    }

    #[test]
    fn query_requires_calendar_id() {
        let err = FreeBusyQuery::from_form("  ", "2024-01-01", "2024-01-02").unwrap_err();
        assert_eq!(err, QueryError::MissingCalendarId);
    }

    #[test]
    fn query_propagates_time_errors() {
        let err = FreeBusyQuery::from_form("primary", "2024-01-02", "2024-01-01").unwrap_err();
        assert!(matches!(err, QueryError::Time(TimeError::EmptyWindow { .. })));
    }
}
