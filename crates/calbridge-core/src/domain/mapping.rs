//! Per-pair identity mapping
//!
//! Bidirectional event id <-> page id table. Entries are only ever added or
//! removed, never rewritten, and each id appears in at most one entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{EventId, PageId};

/// Bidirectional one-to-one mapping between event ids and page ids
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityMapping {
    source_to_target: BTreeMap<EventId, PageId>,
    target_to_source: BTreeMap<PageId, EventId>,
}

impl IdentityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a correspondence
    ///
    /// Linking an already-linked pair again is a no-op.
    ///
    /// # Errors
    /// [`DomainError::MappingConflict`] if either id is already linked to a
    /// different counterpart.
    pub fn link(&mut self, event: EventId, page: PageId) -> Result<(), DomainError> {
        match (self.source_to_target.get(&event), self.target_to_source.get(&page)) {
            (Some(p), Some(e)) if *p == page && *e == event => return Ok(()),
            (None, None) => {}
            _ => {
                return Err(DomainError::MappingConflict {
                    source_id: event.to_string(),
                    target_id: page.to_string(),
                })
            }
        }
        self.source_to_target.insert(event.clone(), page.clone());
        self.target_to_source.insert(page, event);
        Ok(())
    }

    pub fn target_for(&self, event: &EventId) -> Option<&PageId> {
        self.source_to_target.get(event)
    }

    pub fn source_for(&self, page: &PageId) -> Option<&EventId> {
        self.target_to_source.get(page)
    }

    /// Remove the entry keyed by an event id, returning its page id
    pub fn unlink_source(&mut self, event: &EventId) -> Option<PageId> {
        let page = self.source_to_target.remove(event)?;
        self.target_to_source.remove(&page);
        Some(page)
    }

    /// Remove the entry keyed by a page id, returning its event id
    pub fn unlink_target(&mut self, page: &PageId) -> Option<EventId> {
        let event = self.target_to_source.remove(page)?;
        self.source_to_target.remove(&event);
        Some(event)
    }

    pub fn len(&self) -> usize {
        self.source_to_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_to_target.is_empty()
    }

    /// Snapshot of all entries, in event id order
    pub fn entries(&self) -> Vec<(EventId, PageId)> {
        self.source_to_target
            .iter()
            .map(|(e, p)| (e.clone(), p.clone()))
            .collect()
    }

    /// True when both directions hold exactly the same entries
    ///
    /// Persisted maps written by older builds may have drifted; callers
    /// repair with [`IdentityMapping::repaired`].
    pub fn is_consistent(&self) -> bool {
        self.source_to_target.len() == self.target_to_source.len()
            && self
                .source_to_target
                .iter()
                .all(|(e, p)| self.target_to_source.get(p) == Some(e))
    }

    /// Rebuild from the forward direction, dropping entries that would break 1:1
    #[must_use]
    pub fn repaired(&self) -> Self {
        let mut fixed = Self::new();
        for (event, page) in &self.source_to_target {
            let _ = fixed.link(event.clone(), page.clone());
        }
        fixed
    }
}
