//! Record translation between calendar events and database records
//!
//! Pure functions, no I/O. The reconciler calls these with a
//! [`SchemaBinding`] resolved from the database schema at the start of a pass.
//!
//! ## Date conventions
//!
//! ```text
//! calendar all-day   start=2024-01-10  end=2024-01-13 (exclusive)
//! database date      start=2024-01-10  end=2024-01-12 (inclusive)
//! single-day event   start=2024-01-10  end=None
//! ```
//!
//! Timed events always carry an explicit end on the database side.
//!
//! ## Provenance
//!
//! Events materialized from a record get a footer naming the record, appended
//! after the user's text. The footer is stripped before any content comparison
//! and before text is copied back into the database.

use std::collections::BTreeMap;

use crate::domain::{
    CalendarEvent, DatabaseRecord, DomainError, EventDraft, PropertyValue, SchemaBinding,
};

const FOOTER_RULE: &str = "---\nSynced from: ";

/// Properties to write for `event`, limited to what the binding declares
pub fn event_to_properties(
    event: &CalendarEvent,
    binding: &SchemaBinding,
) -> BTreeMap<String, PropertyValue> {
    let mut properties = BTreeMap::new();
    properties.insert(binding.title.clone(), PropertyValue::Title(event.title.clone()));

    let end = if event.start.is_all_day() {
        let inclusive = event.end.shift_days(-1);
        (inclusive.is_all_day() && inclusive.to_utc() > event.start.to_utc()).then_some(inclusive)
    } else {
        Some(event.end)
    };
    properties.insert(
        binding.date.clone(),
        PropertyValue::Date {
            start: event.start,
            end,
        },
    );

    if let Some(body) = &binding.body {
        let text = strip_provenance(event.description.as_deref().unwrap_or_default());
        properties.insert(body.clone(), PropertyValue::RichText(text.trim().to_string()));
    }

    properties
}

/// Event content for `record`
///
/// # Errors
/// [`DomainError::MissingDate`] if the record has no value for the bound date property
pub fn record_to_draft(
    record: &DatabaseRecord,
    binding: &SchemaBinding,
) -> Result<EventDraft, DomainError> {
    let (start, inclusive_end) = record
        .date_range(binding)
        .ok_or_else(|| DomainError::MissingDate(record.id.to_string()))?;

    let end = match inclusive_end {
        Some(end) if end.is_all_day() != start.is_all_day() => start.default_end(),
        Some(end) if end.is_all_day() => end.shift_days(1),
        Some(end) => end,
        None => start.default_end(),
    };

    Ok(EventDraft {
        title: record.title(binding).to_string(),
        description: Some(describe_record(record.body(binding), record)),
        start,
        end,
    })
}

/// Event description for `record`: `user_text` followed by the provenance footer
///
/// The reconciler passes the event's own text here when the database has no
/// body property, so an update from the record does not wipe it.
pub fn describe_record(user_text: Option<&str>, record: &DatabaseRecord) -> String {
    let footer = format!("{FOOTER_RULE}{}\nRecord ID: {}", record.url, record.id);
    match user_text.map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => format!("{text}\n\n{footer}"),
        None => footer,
    }
}

/// User-authored part of an event description
pub fn strip_provenance(text: &str) -> &str {
    if text.starts_with(FOOTER_RULE) {
        return "";
    }
    match text.rfind(&format!("\n\n{FOOTER_RULE}")) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Heuristic match for records with no mapping entry
///
/// Same title, same start, and when both sides carry body text, one body
/// contains the other.
pub fn content_matches(
    event: &CalendarEvent,
    record: &DatabaseRecord,
    binding: &SchemaBinding,
) -> bool {
    if event.title != record.title(binding) {
        return false;
    }
    match record.date_range(binding) {
        Some((start, _)) if start == event.start => {}
        _ => return false,
    }

    let event_text = strip_provenance(event.description.as_deref().unwrap_or_default()).trim();
    match record.body(binding).map(str::trim) {
        Some(record_text) if !event_text.is_empty() && !record_text.is_empty() => {
            event_text.contains(record_text) || record_text.contains(event_text)
        }
        _ => true,
    }
}

/// Full equality of the fields the engine synchronises
///
/// Used to suppress writes when both sides already agree.
pub fn same_content(
    event: &CalendarEvent,
    record: &DatabaseRecord,
    binding: &SchemaBinding,
) -> bool {
    let Ok(draft) = record_to_draft(record, binding) else {
        return false;
    };
    if event.title != draft.title || event.start != draft.start || event.end != draft.end {
        return false;
    }
    if binding.body.is_none() {
        return true;
    }
    let event_text = strip_provenance(event.description.as_deref().unwrap_or_default()).trim();
    event_text == record.body(binding).unwrap_or_default().trim()
}
