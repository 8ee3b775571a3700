//! Notion adapter for [`IRecordStore`]
//!
//! ## Endpoints
//!
//! ```text
//! GET   /databases/{id}         schema
//! POST  /databases/{id}/query   records (cursor paged)
//! POST  /pages                  create
//! PATCH /pages/{id}             update properties, or {"archived": true}
//! ```
//!
//! Only title, rich-text and date properties are decoded; everything else is
//! kept as raw JSON and never written back.

use std::collections::BTreeMap;

use anyhow::Context;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use calbridge_core::config::RecordsConfig;
use calbridge_core::domain::{
    DatabaseId, DatabaseRecord, EventTime, PageId, PropertyType, PropertyValue, TargetSchema,
};
use calbridge_core::ports::IRecordStore;

use crate::client::{encode_segment, ApiClient};
use crate::RemoteError;

/// Base URL for the Notion API
pub const NOTION_BASE_URL: &str = "https://api.notion.com/v1";

/// Default `Notion-Version` header
pub const NOTION_API_VERSION: &str = "2022-06-28";

const PAGE_SIZE: u32 = 100;

/// Longest text Notion accepts in one rich-text object
const TEXT_CHUNK: usize = 2000;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct DatabaseObject {
    #[serde(default)]
    properties: BTreeMap<String, PropertySchema>,
}

#[derive(Debug, Deserialize)]
struct PropertySchema {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<PageObject>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    id: String,
    #[serde(default)]
    url: String,
    created_time: DateTime<Utc>,
    last_edited_time: DateTime<Utc>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

impl PageObject {
    fn into_domain(self) -> Result<DatabaseRecord, RemoteError> {
        let mut properties = BTreeMap::new();
        for (name, raw) in self.properties {
            if let Some(value) = decode_property(&raw) {
                properties.insert(name, value);
            }
        }
        Ok(DatabaseRecord {
            id: PageId::new(self.id).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?,
            url: self.url,
            properties,
            created_at: self.created_time,
            updated_at: self.last_edited_time,
            archived: self.archived,
        })
    }
}

fn schema_type(kind: &str) -> PropertyType {
    match kind {
        "title" => PropertyType::Title,
        "rich_text" => PropertyType::RichText,
        "date" => PropertyType::Date,
        other => PropertyType::Other(other.to_string()),
    }
}

fn plain_text(items: &Value) -> String {
    items
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

/// Decodes one property value; an empty date decodes to nothing
fn decode_property(raw: &Value) -> Option<PropertyValue> {
    match raw.get("type").and_then(Value::as_str) {
        Some("title") => Some(PropertyValue::Title(plain_text(&raw["title"]))),
        Some("rich_text") => Some(PropertyValue::RichText(plain_text(&raw["rich_text"]))),
        Some("date") => {
            let date = raw.get("date").filter(|d| !d.is_null())?;
            let start = date.get("start").and_then(Value::as_str)?;
            let parsed = EventTime::parse(start).and_then(|start| {
                let end = match date.get("end").and_then(Value::as_str) {
                    Some(end) => Some(EventTime::parse(end)?),
                    None => None,
                };
                Ok(PropertyValue::Date { start, end })
            });
            Some(parsed.unwrap_or_else(|_| PropertyValue::Unsupported(raw.clone())))
        }
        _ => Some(PropertyValue::Unsupported(raw.clone())),
    }
}

fn text_objects(text: &str) -> Value {
    let chars: Vec<char> = text.chars().collect();
    Value::Array(
        chars
            .chunks(TEXT_CHUNK)
            .map(|chunk| {
                json!({
                    "type": "text",
                    "text": { "content": chunk.iter().collect::<String>() }
                })
            })
            .collect(),
    )
}

/// Encodes the writable properties; unsupported values are skipped
fn encode_properties(properties: &BTreeMap<String, PropertyValue>) -> Value {
    let mut out = Map::new();
    for (name, value) in properties {
        let encoded = match value {
            PropertyValue::Title(text) => json!({ "title": text_objects(text) }),
            PropertyValue::RichText(text) => json!({ "rich_text": text_objects(text) }),
            PropertyValue::Date { start, end } => json!({
                "date": {
                    "start": start.to_string(),
                    "end": end.map(|e| e.to_string()),
                }
            }),
            PropertyValue::Unsupported(_) => continue,
        };
        out.insert(name.clone(), encoded);
    }
    Value::Object(out)
}

// ============================================================================
// NotionRecordStore
// ============================================================================

/// Record store backed by Notion databases
pub struct NotionRecordStore {
    client: ApiClient,
}

impl NotionRecordStore {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self::with_base_url(access_token, NOTION_BASE_URL, NOTION_API_VERSION)
    }

    /// Creates a store against a custom base URL (useful for testing)
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            client: ApiClient::new(base_url, access_token).with_header("Notion-Version", api_version),
        }
    }

    /// Builds a store from the `records` config section
    ///
    /// # Errors
    /// Returns error if no access token is configured
    pub fn from_config(config: &RecordsConfig) -> anyhow::Result<Self> {
        let token = config
            .access_token
            .as_deref()
            .context("records.access_token is not set")?;
        Ok(Self::with_base_url(
            token,
            config.base_url.clone(),
            config.api_version.clone(),
        ))
    }

    fn page_path(page: &PageId) -> String {
        format!("/pages/{}", encode_segment(page.as_str()))
    }
}

#[async_trait::async_trait]
impl IRecordStore for NotionRecordStore {
    async fn get_schema(&self, database: &DatabaseId) -> anyhow::Result<TargetSchema> {
        let path = format!("/databases/{}", encode_segment(database.as_str()));
        let object: DatabaseObject = self
            .client
            .json(Method::GET, &path, None)
            .await
            .with_context(|| format!("Failed to fetch schema of database {database}"))?;

        Ok(TargetSchema {
            properties: object
                .properties
                .into_iter()
                .map(|(name, schema)| (name, schema_type(&schema.kind)))
                .collect(),
        })
    }

    #[instrument(skip(self, database), fields(database = %database))]
    async fn query_records(&self, database: &DatabaseId) -> anyhow::Result<Vec<DatabaseRecord>> {
        let path = format!("/databases/{}/query", encode_segment(database.as_str()));
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let page: QueryResponse = self
                .client
                .json(Method::POST, &path, Some(&body))
                .await
                .context("Failed to query database records")?;

            for object in page.results {
                let record = object.into_domain()?;
                if !record.archived {
                    records.push(record);
                }
            }

            match (page.has_more, page.next_cursor) {
                (true, Some(next)) => cursor = Some(next),
                _ => break,
            }
        }

        debug!(records = records.len(), "Queried database records");
        Ok(records)
    }

    async fn create_record(
        &self,
        database: &DatabaseId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> anyhow::Result<DatabaseRecord> {
        let body = json!({
            "parent": { "database_id": database.as_str() },
            "properties": encode_properties(properties),
        });
        let page: PageObject = self
            .client
            .json(Method::POST, "/pages", Some(&body))
            .await
            .context("Failed to create database record")?;
        Ok(page.into_domain()?)
    }

    async fn update_record(
        &self,
        page: &PageId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> anyhow::Result<DatabaseRecord> {
        let body = json!({ "properties": encode_properties(properties) });
        let updated: PageObject = self
            .client
            .json(Method::PATCH, &Self::page_path(page), Some(&body))
            .await
            .with_context(|| format!("Failed to update database record {page}"))?;
        Ok(updated.into_domain()?)
    }

    async fn archive_record(&self, page: &PageId) -> anyhow::Result<()> {
        let body = json!({ "archived": true });
        match self
            .client
            .execute(Method::PATCH, &Self::page_path(page), Some(&body))
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_missing() => {
                debug!(page = %page, "Record already gone");
                Ok(())
            }
            Err(e) => {
                Err(anyhow::Error::new(e).context(format!("Failed to archive database record {page}")))
            }
        }
    }
}
