//! Calendar store port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific.
//!   Adapters attach a typed error (e.g. a rate-limit error) that callers can
//!   recover with `downcast_ref`.
//! - Credentials are the adapter's concern; every method assumes it can
//!   authenticate.

use chrono::{DateTime, Utc};

use crate::domain::{CalendarEvent, CalendarId, EventDraft, EventId};

/// Port trait for the calendar side of a pair
#[async_trait::async_trait]
pub trait ICalendarStore: Send + Sync {
    /// Lists events overlapping `[time_min, time_max]`, recurring events expanded
    ///
    /// Cancelled events may be included; callers check [`CalendarEvent::is_live`].
    async fn list_events(
        &self,
        calendar: &CalendarId,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarEvent>>;

    /// Creates an event and returns it as stored (with its new id)
    async fn create_event(
        &self,
        calendar: &CalendarId,
        draft: &EventDraft,
    ) -> anyhow::Result<CalendarEvent>;

    /// Overwrites the writable fields of an existing event
    async fn update_event(
        &self,
        calendar: &CalendarId,
        event: &EventId,
        draft: &EventDraft,
    ) -> anyhow::Result<CalendarEvent>;

    /// Deletes an event. Deleting an already-deleted event succeeds.
    async fn delete_event(&self, calendar: &CalendarId, event: &EventId) -> anyhow::Result<()>;
}
