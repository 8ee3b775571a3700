//! Google Calendar adapter against a mock server

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{
    body_partial_json, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, ResponseTemplate};

use calbridge_core::domain::{CalendarId, EventDraft, EventId, EventTime};
use calbridge_core::ports::ICalendarStore;
use calbridge_remote::RemoteError;

use crate::common::{google_event, setup_calendar_mock};

fn primary() -> CalendarId {
    CalendarId::new("primary").unwrap()
}

fn window() -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
    (
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    )
}

#[tokio::test]
async fn test_list_events_follows_pages() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("timeMin", "2020-01-01T00:00:00Z"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [google_event("evt-1", "Standup", "2024-01-10", "2024-01-11")],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [google_event("evt-2", "Retro", "2024-01-12", "2024-01-13")]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (min, max) = window();
    let events = store.list_events(&primary(), min, max).await.unwrap();

    let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
    assert_eq!(titles, vec!["Standup", "Retro"]);
    assert!(events[0].start.is_all_day());
    assert_eq!(
        events[0].html_link.as_deref(),
        Some("https://calendar.test/event?eid=evt-1")
    );
}

#[tokio::test]
async fn test_create_event_sends_all_day_body() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("POST"))
        .and(path("/calendars/primary/events"))
        .and(body_partial_json(json!({
            "summary": "Standup",
            "start": {"date": "2024-01-10"},
            "end": {"date": "2024-01-11"}
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(google_event("evt-new", "Standup", "2024-01-10", "2024-01-11")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let draft = EventDraft {
        title: "Standup".into(),
        description: Some("---\nSynced from: https://notion.test/p\nRecord ID: p".into()),
        start: EventTime::parse("2024-01-10").unwrap(),
        end: EventTime::parse("2024-01-11").unwrap(),
    };
    let created = store.create_event(&primary(), &draft).await.unwrap();
    assert_eq!(created.id.as_str(), "evt-new");
}

#[tokio::test]
async fn test_update_event_patches() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/calendars/primary/events/evt-1"))
        .and(body_partial_json(json!({"summary": "Daily standup"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(google_event("evt-1", "Daily standup", "2024-01-10", "2024-01-11")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let draft = EventDraft {
        title: "Daily standup".into(),
        description: None,
        start: EventTime::parse("2024-01-10").unwrap(),
        end: EventTime::parse("2024-01-11").unwrap(),
    };
    let updated = store
        .update_event(&primary(), &EventId::new("evt-1").unwrap(), &draft)
        .await
        .unwrap();
    assert_eq!(updated.title, "Daily standup");
}

#[tokio::test]
async fn test_delete_of_missing_event_succeeds() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/evt-gone"))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({
            "error": {"code": 410, "message": "Resource has been deleted"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    store
        .delete_event(&primary(), &EventId::new("evt-gone").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_server_error_keeps_status_in_chain() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/calendars/primary/events/evt-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = store
        .delete_event(&primary(), &EventId::new("evt-1").unwrap())
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Server error (503)"), "{message}");
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::ServerError { status: 503, .. })
    ));
}

#[tokio::test]
async fn test_rate_limit_is_retried_once() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (min, max) = window();
    let events = store.list_events(&primary(), min, max).await.unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_unauthorized_is_typed() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let (min, max) = window();
    let err = store.list_events(&primary(), min, max).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::Unauthorized(_))
    ));
}

#[tokio::test]
async fn test_unreadable_event_fails_listing() {
    let (server, store) = setup_calendar_mock().await;

    let mut broken = google_event("evt-2", "Retro", "2024-01-12", "2024-01-13");
    broken["start"] = json!({"date": "not-a-date"});
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [google_event("evt-1", "Standup", "2024-01-10", "2024-01-11"), broken]
        })))
        .mount(&server)
        .await;

    let (min, max) = window();
    let err = store.list_events(&primary(), min, max).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Unreadable event evt-2"), "{message}");
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_cancelled_event_without_times_is_ignored() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                google_event("evt-1", "Standup", "2024-01-10", "2024-01-11"),
                {"kind": "calendar#event", "id": "evt-2", "status": "cancelled"}
            ]
        })))
        .mount(&server)
        .await;

    let (min, max) = window();
    let events = store.list_events(&primary(), min, max).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id.as_str(), "evt-1");
}

#[tokio::test]
async fn test_calendar_id_is_path_encoded() {
    let (server, store) = setup_calendar_mock().await;

    Mock::given(method("GET"))
        .and(path("/calendars/team+cal%2Bops/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(0)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/calendars/team%20cal%2Bops/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let (min, max) = window();
    let events = store
        .list_events(&CalendarId::new("team cal+ops").unwrap(), min, max)
        .await
        .unwrap();
    assert!(events.is_empty());
}
