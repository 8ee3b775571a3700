//! Database record snapshot types
//!
//! The record store exposes typed, user-defined properties. Only three roles
//! matter to reconciliation: the title, the date range, and optionally a
//! free-text body. [`TargetSchema::bind`] resolves those roles to concrete
//! property names once per pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::event::EventTime;
use super::newtypes::PageId;

/// Type of a database property, as declared by the schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Title,
    RichText,
    Date,
    /// Any type the engine does not write (select, number, people, ...)
    Other(String),
}

/// Database schema: property name to declared type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSchema {
    pub properties: BTreeMap<String, PropertyType>,
}

/// Property names bound to the roles the translator reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaBinding {
    pub title: String,
    pub date: String,
    /// Rich-text property receiving the event description, if the schema has one
    pub body: Option<String>,
}

impl TargetSchema {
    /// Resolve title, date and body property names
    ///
    /// `date_hint` selects a specific date property when the database has
    /// several; otherwise the first date property (by name) is used. The body
    /// role is bound only when `body_name` exists and is a rich-text property.
    ///
    /// # Errors
    /// [`DomainError::MissingProperty`] if no title or no date property exists
    pub fn bind(&self, date_hint: Option<&str>, body_name: &str) -> Result<SchemaBinding, DomainError> {
        let title = self
            .first_of(&PropertyType::Title)
            .ok_or_else(|| DomainError::MissingProperty {
                kind: "title".to_string(),
            })?;

        let hinted = date_hint.filter(|name| self.properties.get(*name) == Some(&PropertyType::Date));
        let date = hinted
            .or_else(|| self.first_of(&PropertyType::Date))
            .ok_or_else(|| DomainError::MissingProperty {
                kind: "date".to_string(),
            })?;

        let body = (self.properties.get(body_name) == Some(&PropertyType::RichText))
            .then(|| body_name.to_string());

        Ok(SchemaBinding {
            title: title.to_string(),
            date: date.to_string(),
            body,
        })
    }

    fn first_of(&self, kind: &PropertyType) -> Option<&str> {
        self.properties
            .iter()
            .find(|(_, t)| *t == kind)
            .map(|(name, _)| name.as_str())
    }
}

/// Value of a single database property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    /// Date range; `end` is inclusive and absent for single-day or point values
    Date {
        start: EventTime,
        end: Option<EventTime>,
    },
    Unsupported(serde_json::Value),
}

/// Snapshot of one database record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRecord {
    pub id: PageId,
    pub url: String,
    pub properties: BTreeMap<String, PropertyValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived: bool,
}

impl DatabaseRecord {
    /// Text of the bound title property (empty if unset)
    #[must_use]
    pub fn title(&self, binding: &SchemaBinding) -> &str {
        match self.properties.get(&binding.title) {
            Some(PropertyValue::Title(text)) => text,
            _ => "",
        }
    }

    /// Start and inclusive end of the bound date property
    #[must_use]
    pub fn date_range(&self, binding: &SchemaBinding) -> Option<(EventTime, Option<EventTime>)> {
        match self.properties.get(&binding.date) {
            Some(PropertyValue::Date { start, end }) => Some((*start, *end)),
            _ => None,
        }
    }

    /// Text of the bound body property, if the schema declares one and it is non-empty
    #[must_use]
    pub fn body(&self, binding: &SchemaBinding) -> Option<&str> {
        let name = binding.body.as_ref()?;
        match self.properties.get(name) {
            Some(PropertyValue::RichText(text)) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    /// True if the record was created or edited at or after `since`
    #[must_use]
    pub fn touched_since(&self, since: DateTime<Utc>) -> bool {
        self.created_at >= since || self.updated_at >= since
    }
}
