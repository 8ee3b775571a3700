//! Google Calendar v3 adapter for [`ICalendarStore`]
//!
//! ## Endpoints
//!
//! ```text
//! GET    /calendars/{cal}/events?timeMin&timeMax&singleEvents=true   list (paged)
//! POST   /calendars/{cal}/events                                     create
//! PATCH  /calendars/{cal}/events/{id}                                update
//! DELETE /calendars/{cal}/events/{id}                                delete
//! ```
//!
//! Recurring events are expanded into instances by the API. An all-day value
//! is sent as `{"date": ...}` with `dateTime` nulled so a PATCH can switch
//! an event between all-day and timed.

use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use calbridge_core::config::CalendarConfig;
use calbridge_core::domain::{
    CalendarEvent, CalendarId, EventDraft, EventId, EventStatus, EventTime,
};
use calbridge_core::ports::ICalendarStore;

use crate::client::{encode_segment, ApiClient};
use crate::RemoteError;

/// Base URL for the Google Calendar API v3
pub const GOOGLE_CALENDAR_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

const PAGE_SIZE: u32 = 250;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<GoogleEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<GoogleTime>,
    end: Option<GoogleTime>,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    html_link: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTime {
    date: Option<String>,
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl GoogleTime {
    fn from_event_time(time: &EventTime) -> Self {
        match time {
            EventTime::Date(_) => Self {
                date: Some(time.to_string()),
                ..Self::default()
            },
            EventTime::DateTime(_) => Self {
                date_time: Some(time.to_string()),
                ..Self::default()
            },
        }
    }

    fn to_event_time(&self) -> Result<EventTime, RemoteError> {
        let raw = self
            .date_time
            .as_deref()
            .or(self.date.as_deref())
            .ok_or_else(|| RemoteError::InvalidResponse("event time without date".into()))?;
        EventTime::parse(raw).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: GoogleTime,
    end: GoogleTime,
}

impl<'a> EventBody<'a> {
    fn from_draft(draft: &'a EventDraft) -> Self {
        Self {
            summary: &draft.title,
            description: draft.description.as_deref(),
            start: GoogleTime::from_event_time(&draft.start),
            end: GoogleTime::from_event_time(&draft.end),
        }
    }

    fn to_value(&self) -> Result<Value, RemoteError> {
        serde_json::to_value(self).map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

impl GoogleEvent {
    fn into_domain(self) -> Result<CalendarEvent, RemoteError> {
        let status = match self.status.as_deref() {
            Some("cancelled") => EventStatus::Cancelled,
            Some("tentative") => EventStatus::Tentative,
            _ => EventStatus::Confirmed,
        };
        let start = self
            .start
            .as_ref()
            .ok_or_else(|| RemoteError::InvalidResponse(format!("event {} has no start", self.id)))?
            .to_event_time()?;
        let end = match &self.end {
            Some(end) => end.to_event_time()?,
            None => start.default_end(),
        };
        let updated_at = self.updated.or(self.created).unwrap_or_else(Utc::now);

        Ok(CalendarEvent {
            id: EventId::new(self.id).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?,
            title: self.summary.unwrap_or_default(),
            description: self.description,
            start,
            end,
            status,
            created_at: self.created.unwrap_or(updated_at),
            updated_at,
            html_link: self.html_link,
        })
    }
}

// ============================================================================
// GoogleCalendarStore
// ============================================================================

/// Calendar store backed by the Google Calendar API
pub struct GoogleCalendarStore {
    client: ApiClient,
}

impl GoogleCalendarStore {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, GOOGLE_CALENDAR_BASE_URL)
    }

    /// Creates a store against a custom base URL (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: ApiClient::new(base_url, access_token),
        }
    }

    /// Builds a store from the `calendar` config section
    ///
    /// # Errors
    /// Returns error if no access token is configured
    pub fn from_config(config: &CalendarConfig) -> anyhow::Result<Self> {
        let token = config
            .access_token
            .as_deref()
            .context("calendar.access_token is not set")?;
        Ok(Self::with_base_url(token, config.base_url.clone()))
    }

    fn events_path(calendar: &CalendarId) -> String {
        format!("/calendars/{}/events", encode_segment(calendar.as_str()))
    }

    fn event_path(calendar: &CalendarId, event: &EventId) -> String {
        format!(
            "{}/{}",
            Self::events_path(calendar),
            encode_segment(event.as_str())
        )
    }
}

#[async_trait::async_trait]
impl ICalendarStore for GoogleCalendarStore {
    #[instrument(skip(self, calendar), fields(calendar = %calendar))]
    async fn list_events(
        &self,
        calendar: &CalendarId,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0u32;

        loop {
            let path = {
                let mut query = url::form_urlencoded::Serializer::new(String::new());
                query
                    .append_pair("timeMin", &time_min.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .append_pair("timeMax", &time_max.to_rfc3339_opts(SecondsFormat::Secs, true))
                    .append_pair("singleEvents", "true")
                    .append_pair("maxResults", &PAGE_SIZE.to_string());
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
                format!("{}?{}", Self::events_path(calendar), query.finish())
            };

            let page: EventList = self
                .client
                .json(Method::GET, &path, None)
                .await
                .context("Failed to list calendar events")?;
            pages += 1;

            for item in page.items {
                let id = item.id.clone();
                let cancelled = item.status.as_deref() == Some("cancelled");
                match item.into_domain() {
                    Ok(event) => events.push(event),
                    // cancelled instances can arrive without times and are never live
                    Err(e) if cancelled => {
                        debug!(event = %id, error = %e, "Ignoring cancelled event without times")
                    }
                    // a listing with holes would read as deletions downstream
                    Err(e) => {
                        return Err(anyhow::Error::new(e)
                            .context(format!("Unreadable event {id} in calendar {calendar}")))
                    }
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(events = events.len(), pages, "Listed calendar events");
        Ok(events)
    }

    async fn create_event(
        &self,
        calendar: &CalendarId,
        draft: &EventDraft,
    ) -> anyhow::Result<CalendarEvent> {
        let body = EventBody::from_draft(draft).to_value()?;
        let created: GoogleEvent = self
            .client
            .json(Method::POST, &Self::events_path(calendar), Some(&body))
            .await
            .context("Failed to create calendar event")?;
        Ok(created.into_domain()?)
    }

    async fn update_event(
        &self,
        calendar: &CalendarId,
        event: &EventId,
        draft: &EventDraft,
    ) -> anyhow::Result<CalendarEvent> {
        let body = EventBody::from_draft(draft).to_value()?;
        let updated: GoogleEvent = self
            .client
            .json(Method::PATCH, &Self::event_path(calendar, event), Some(&body))
            .await
            .with_context(|| format!("Failed to update calendar event {event}"))?;
        Ok(updated.into_domain()?)
    }

    async fn delete_event(&self, calendar: &CalendarId, event: &EventId) -> anyhow::Result<()> {
        match self
            .client
            .execute(Method::DELETE, &Self::event_path(calendar, event), None)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_missing() => {
                debug!(event = %event, "Event already deleted");
                Ok(())
            }
            Err(e) => {
                Err(anyhow::Error::new(e).context(format!("Failed to delete calendar event {event}")))
            }
        }
    }
}
