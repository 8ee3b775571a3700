//! Notion adapter against a mock server

use std::collections::BTreeMap;

use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use calbridge_core::domain::{DatabaseId, EventTime, PageId, PropertyType, PropertyValue};
use calbridge_core::ports::IRecordStore;

use crate::common::{notion_page, setup_notion_mock};

fn db() -> DatabaseId {
    DatabaseId::new("db-1").unwrap()
}

#[tokio::test]
async fn test_get_schema_maps_property_types() {
    let (server, store) = setup_notion_mock().await;

    Mock::given(method("GET"))
        .and(path("/databases/db-1"))
        .and(header("Notion-Version", "2022-06-28"))
        .and(header("authorization", "Bearer secret_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "database",
            "id": "db-1",
            "properties": {
                "Name": {"id": "title", "type": "title", "title": {}},
                "When": {"id": "a", "type": "date", "date": {}},
                "Description": {"id": "b", "type": "rich_text", "rich_text": {}},
                "Status": {"id": "c", "type": "select", "select": {"options": []}}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let schema = store.get_schema(&db()).await.unwrap();
    assert_eq!(schema.properties["Name"], PropertyType::Title);
    assert_eq!(schema.properties["When"], PropertyType::Date);
    assert_eq!(schema.properties["Description"], PropertyType::RichText);
    assert_eq!(schema.properties["Status"], PropertyType::Other("select".into()));
}

#[tokio::test]
async fn test_query_follows_cursor() {
    let (server, store) = setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_json(json!({"page_size": 100})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [notion_page("page-1", "Standup", Some("2024-01-10"))],
            "has_more": true,
            "next_cursor": "cur-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .and(body_partial_json(json!({"start_cursor": "cur-2"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "results": [notion_page("page-2", "Someday", None)],
            "has_more": false,
            "next_cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = store.query_records(&db()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].url, "https://www.notion.so/page-1");
    assert_eq!(
        records[0].properties["Date"],
        PropertyValue::Date {
            start: EventTime::parse("2024-01-10").unwrap(),
            end: None
        }
    );
    assert!(!records[1].properties.contains_key("Date"));
    assert!(records[0].updated_at > records[0].created_at);
}

#[tokio::test]
async fn test_create_record_sends_parent_and_properties() {
    let (server, store) = setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/pages"))
        .and(body_partial_json(json!({
            "parent": {"database_id": "db-1"},
            "properties": {
                "Name": {"title": [{"type": "text", "text": {"content": "Standup"}}]},
                "Date": {"date": {"start": "2024-01-10", "end": null}}
            }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(notion_page("page-new", "Standup", Some("2024-01-10"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut properties = BTreeMap::new();
    properties.insert("Name".to_string(), PropertyValue::Title("Standup".into()));
    properties.insert(
        "Date".to_string(),
        PropertyValue::Date {
            start: EventTime::parse("2024-01-10").unwrap(),
            end: None,
        },
    );

    let record = store.create_record(&db(), &properties).await.unwrap();
    assert_eq!(record.id.as_str(), "page-new");
}

#[tokio::test]
async fn test_archive_sends_archived_flag() {
    let (server, store) = setup_notion_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/pages/page-1"))
        .and(body_json(json!({"archived": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(notion_page("page-1", "x", None)))
        .expect(1)
        .mount(&server)
        .await;

    store
        .archive_record(&PageId::new("page-1").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_archive_of_missing_page_succeeds() {
    let (server, store) = setup_notion_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/pages/page-gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "object": "error", "status": 404, "code": "object_not_found"
        })))
        .mount(&server)
        .await;

    store
        .archive_record(&PageId::new("page-gone").unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_query_server_error_is_reported() {
    let (server, store) = setup_notion_mock().await;

    Mock::given(method("POST"))
        .and(path("/databases/db-1/query"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = store.query_records(&db()).await.unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Failed to query database records"), "{message}");
    assert!(message.contains("502"), "{message}");
}
