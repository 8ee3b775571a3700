//! Calendar event snapshot types
//!
//! A [`CalendarEvent`] is what the calendar store returns for a listing;
//! an [`EventDraft`] is the subset of fields the engine writes back.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::EventId;

// ============================================================================
// EventTime
// ============================================================================

/// Start or end of an event: either a whole day or an instant
///
/// All-day vs timed is decided by the presence of a time component in the
/// wire string (`2024-01-10` vs `2024-01-10T09:00:00+02:00`). Two timed
/// values are equal when they denote the same instant, whatever their offsets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventTime {
    /// All-day value
    Date(NaiveDate),
    /// Timed value with its original UTC offset
    DateTime(DateTime<FixedOffset>),
}

impl EventTime {
    /// Parse a wire date string
    ///
    /// Accepts `YYYY-MM-DD`, RFC 3339 date-times, and offset-less date-times
    /// (interpreted as UTC).
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        let value = value.trim();
        if value.contains('T') {
            if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
                return Ok(Self::DateTime(dt));
            }
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| Self::DateTime(naive.and_utc().fixed_offset()))
                .map_err(|_| DomainError::InvalidDate(value.to_string()))
        } else {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map(Self::Date)
                .map_err(|_| DomainError::InvalidDate(value.to_string()))
        }
    }

    /// Returns true for whole-day values
    #[must_use]
    pub fn is_all_day(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// Shift an all-day value by whole days; timed values are returned unchanged
    #[must_use]
    pub fn shift_days(self, days: i64) -> Self {
        match self {
            Self::Date(d) => Self::Date(d + Duration::days(days)),
            other => other,
        }
    }

    /// End used when a record carries only a start: next day or one hour later
    #[must_use]
    pub fn default_end(self) -> Self {
        match self {
            Self::Date(d) => Self::Date(d + Duration::days(1)),
            Self::DateTime(dt) => Self::DateTime(dt + Duration::hours(1)),
        }
    }

    /// Instant used for window filtering (all-day values start at UTC midnight)
    #[must_use]
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            Self::DateTime(dt) => dt.with_timezone(&Utc),
        }
    }
}

impl PartialEq for EventTime {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::DateTime(a), Self::DateTime(b)) => a.timestamp_millis() == b.timestamp_millis(),
            _ => false,
        }
    }
}

impl Eq for EventTime {}

impl Display for EventTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl TryFrom<String> for EventTime {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<EventTime> for String {
    fn from(t: EventTime) -> Self {
        t.to_string()
    }
}

// ============================================================================
// CalendarEvent
// ============================================================================

/// Liveness of a calendar event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Confirmed,
    Tentative,
    /// Deleted on the calendar side; treated as absent by the reconciler
    Cancelled,
}

/// Snapshot of one calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: EventId,
    pub title: String,
    pub description: Option<String>,
    pub start: EventTime,
    /// Exclusive end (for all-day events, the day after the last day)
    pub end: EventTime,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub html_link: Option<String>,
}

impl CalendarEvent {
    /// Returns true unless the event was cancelled
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status != EventStatus::Cancelled
    }

    /// True if the event was created or modified at or after `since`
    #[must_use]
    pub fn touched_since(&self, since: DateTime<Utc>) -> bool {
        self.created_at >= since || self.updated_at >= since
    }

    /// The writable content of this event
    #[must_use]
    pub fn to_draft(&self) -> EventDraft {
        EventDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            start: self.start,
            end: self.end,
        }
    }
}

/// Writable content of an event, used for creates and full overwrites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub title: String,
    pub description: Option<String>,
    pub start: EventTime,
    pub end: EventTime,
}
