//! Shared test helpers for the remote adapter integration tests
//!
//! Each helper starts a wiremock server and returns an adapter pointing at it,
//! plus JSON builders shaped like the real API payloads.

use serde_json::{json, Value};
use wiremock::MockServer;

use calbridge_remote::{GoogleCalendarStore, NotionRecordStore};

pub async fn setup_calendar_mock() -> (MockServer, GoogleCalendarStore) {
    let server = MockServer::start().await;
    let store = GoogleCalendarStore::with_base_url("test-access-token", server.uri());
    (server, store)
}

pub async fn setup_notion_mock() -> (MockServer, NotionRecordStore) {
    let server = MockServer::start().await;
    let store = NotionRecordStore::with_base_url("secret_test", server.uri(), "2022-06-28");
    (server, store)
}

/// An all-day Google Calendar event resource
pub fn google_event(id: &str, summary: &str, start: &str, end: &str) -> Value {
    json!({
        "kind": "calendar#event",
        "id": id,
        "status": "confirmed",
        "htmlLink": format!("https://calendar.test/event?eid={id}"),
        "created": "2024-01-01T08:00:00.000Z",
        "updated": "2024-01-02T08:00:00.000Z",
        "summary": summary,
        "start": {"date": start},
        "end": {"date": end}
    })
}

/// A Notion page in a database with Name/Date/Description properties
pub fn notion_page(id: &str, name: &str, date: Option<&str>) -> Value {
    let date = match date {
        Some(start) => json!({"id": "d1", "type": "date", "date": {"start": start, "end": null, "time_zone": null}}),
        None => json!({"id": "d1", "type": "date", "date": null}),
    };
    json!({
        "object": "page",
        "id": id,
        "url": format!("https://www.notion.so/{id}"),
        "created_time": "2024-01-01T08:00:00.000Z",
        "last_edited_time": "2024-01-03T08:00:00.000Z",
        "archived": false,
        "properties": {
            "Name": {"id": "title", "type": "title", "title": [
                {"type": "text", "text": {"content": name}, "plain_text": name}
            ]},
            "Date": date,
            "Description": {"id": "r1", "type": "rich_text", "rich_text": []}
        }
    })
}
