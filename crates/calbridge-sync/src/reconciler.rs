//! Pair reconciler - one two-phase pass over a (calendar, database) pair
//!
//! ## Pipeline
//!
//! ```text
//! bind schema ──→ fetch ──→ calendar→database ──→ re-fetch ──→ database→calendar ──→ deletions
//!                   │              │                  │               │                 │
//!             both sides,    create/update       both sides     create/update     archive/delete
//!             filtered by    targets, record     again          sources, skip     counterparts of
//!             connection     touched sources                    touched sources   vanished records
//!             time
//! ```
//!
//! Each record is resolved in order: persisted mapping, then content match
//! against unmapped records, then creation of the missing counterpart.
//! When both sides exist and differ, the side with the later `updated_at`
//! overwrites the other (ties go to the calendar during the first phase).
//!
//! Any store error aborts the pass. Writes already issued stay; the mapping
//! is saved after every new link so the next pass picks up where this one
//! stopped without duplicating.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, instrument, warn};

use calbridge_core::config::Config;
use calbridge_core::domain::{
    CalendarEvent, DatabaseRecord, DomainError, EventId, IdentityMapping, PageId, PairKey,
    ReconcileSummary, SchemaBinding,
};
use calbridge_core::ports::{ICalendarStore, IRecordStore};
use calbridge_core::translate;

use crate::state::PairStateStore;
use crate::SyncError;

/// Tunables for a reconciliation pass
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// How far past now calendar events are listed
    pub lookahead: Duration,
    /// Preferred date property name
    pub date_property: Option<String>,
    /// Rich-text property receiving descriptions
    pub body_property: String,
}

impl ReconcileOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            // out-of-range values surface as a window error on the first pass
            lookahead: Duration::try_days(config.sync.lookahead_days).unwrap_or(Duration::MAX),
            date_property: config.schema.date_property.clone(),
            body_property: config.schema.body_property.clone(),
        }
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Filtered view of both stores at one moment
#[derive(Debug, Default)]
struct Snapshot {
    events: Vec<CalendarEvent>,
    records: Vec<DatabaseRecord>,
}

/// Mutable state threaded through the phases of one pass
struct Pass<'a> {
    pair: &'a PairKey,
    binding: SchemaBinding,
    mapping: IdentityMapping,
    /// Sources written to the database in phase 1; phase 2 leaves their targets alone
    touched_sources: HashSet<EventId>,
    created_sources: HashSet<EventId>,
    created_targets: HashSet<PageId>,
    summary: ReconcileSummary,
}

/// Reconciles one pair at a time against the two stores
pub struct PairReconciler {
    calendar: Arc<dyn ICalendarStore>,
    records: Arc<dyn IRecordStore>,
    state: PairStateStore,
    options: ReconcileOptions,
}

impl PairReconciler {
    pub fn new(
        calendar: Arc<dyn ICalendarStore>,
        records: Arc<dyn IRecordStore>,
        state: PairStateStore,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            calendar,
            records,
            state,
            options,
        }
    }

    /// Runs one full pass for `pair`, considering only records touched since `since`
    ///
    /// # Errors
    /// [`SyncError::Schema`] when the database cannot be bound; any store
    /// error otherwise. Either way the pass stops where it failed.
    #[instrument(skip(self, pair), fields(pair = %pair))]
    pub async fn reconcile(
        &self,
        pair: &PairKey,
        since: DateTime<Utc>,
    ) -> Result<ReconcileSummary, SyncError> {
        let binding = self.bind_schema(pair).await?;
        let mapping = self.state.load_mapping(pair).await?;
        debug!(entries = mapping.len(), date = %binding.date, "Starting pass");

        let mut pass = Pass {
            pair,
            binding,
            mapping,
            touched_sources: HashSet::new(),
            created_sources: HashSet::new(),
            created_targets: HashSet::new(),
            summary: ReconcileSummary::default(),
        };

        let snapshot = self.fetch(pair, since).await?;
        self.apply_source_to_target(&mut pass, &snapshot).await?;

        let snapshot = self.fetch(pair, since).await?;
        self.apply_target_to_source(&mut pass, &snapshot).await?;

        self.reconcile_deletions(&mut pass, &snapshot).await?;
        self.state.save_mapping(pair, &pass.mapping).await?;

        let s = &pass.summary;
        info!(
            created_targets = s.created_targets,
            created_sources = s.created_sources,
            updated_targets = s.updated_targets,
            updated_sources = s.updated_sources,
            deleted_targets = s.deleted_targets,
            deleted_sources = s.deleted_sources,
            adopted = s.adopted,
            failed_deletes = s.failed_deletes,
            "Pair reconciled"
        );
        Ok(pass.summary)
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn bind_schema(&self, pair: &PairKey) -> Result<SchemaBinding, SyncError> {
        let schema = self
            .records
            .get_schema(&pair.database_id)
            .await
            .map_err(SyncError::Records)?;
        schema
            .bind(
                self.options.date_property.as_deref(),
                &self.options.body_property,
            )
            .map_err(|e| SyncError::Schema {
                pair: pair.clone(),
                reason: e.to_string(),
            })
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    async fn fetch(&self, pair: &PairKey, since: DateTime<Utc>) -> Result<Snapshot, SyncError> {
        let now = Utc::now();
        let time_max = now.checked_add_signed(self.options.lookahead).ok_or_else(|| {
            SyncError::Window(format!(
                "lookahead of {} days from {now} is out of range",
                self.options.lookahead.num_days()
            ))
        })?;

        let events: Vec<_> = self
            .calendar
            .list_events(&pair.calendar_id, since, time_max)
            .await
            .map_err(SyncError::Calendar)?
            .into_iter()
            .filter(|e| e.is_live() && e.touched_since(since))
            .collect();

        let records: Vec<_> = self
            .records
            .query_records(&pair.database_id)
            .await
            .map_err(SyncError::Records)?
            .into_iter()
            .filter(|r| !r.archived && r.touched_since(since))
            .collect();

        debug!(events = events.len(), records = records.len(), "Fetched snapshot");
        Ok(Snapshot { events, records })
    }

    async fn link(&self, pass: &mut Pass<'_>, event: &EventId, page: &PageId) -> Result<(), SyncError> {
        pass.mapping.link(event.clone(), page.clone())?;
        self.state.save_mapping(pass.pair, &pass.mapping).await
    }

    // ========================================================================
    // Phase 1: calendar → database
    // ========================================================================

    async fn apply_source_to_target(
        &self,
        pass: &mut Pass<'_>,
        snapshot: &Snapshot,
    ) -> Result<(), SyncError> {
        let records: HashMap<&PageId, &DatabaseRecord> =
            snapshot.records.iter().map(|r| (&r.id, r)).collect();

        for event in &snapshot.events {
            if let Some(page) = pass.mapping.target_for(&event.id) {
                // A mapped target missing from the snapshot is a deletion candidate
                if let Some(record) = records.get(page).copied() {
                    self.push_if_newer(pass, event, record).await?;
                }
                continue;
            }

            let adopted = snapshot.records.iter().find(|r| {
                pass.mapping.source_for(&r.id).is_none()
                    && translate::content_matches(event, r, &pass.binding)
            });
            if let Some(record) = adopted {
                debug!(event = %event.id, page = %record.id, "Adopting unmapped record");
                self.link(pass, &event.id, &record.id).await?;
                pass.summary.adopted += 1;
                self.push_if_newer(pass, event, record).await?;
                continue;
            }

            let properties = translate::event_to_properties(event, &pass.binding);
            let created = self
                .records
                .create_record(&pass.pair.database_id, &properties)
                .await
                .map_err(SyncError::Records)?;
            debug!(event = %event.id, page = %created.id, title = %event.title, "Created record");
            self.link(pass, &event.id, &created.id).await?;
            pass.created_targets.insert(created.id);
            pass.touched_sources.insert(event.id.clone());
            pass.summary.created_targets += 1;
        }

        Ok(())
    }

    /// Overwrites the record when the event is at least as recent and content differs
    async fn push_if_newer(
        &self,
        pass: &mut Pass<'_>,
        event: &CalendarEvent,
        record: &DatabaseRecord,
    ) -> Result<(), SyncError> {
        if event.updated_at < record.updated_at
            || translate::same_content(event, record, &pass.binding)
        {
            return Ok(());
        }
        let properties = translate::event_to_properties(event, &pass.binding);
        self.records
            .update_record(&record.id, &properties)
            .await
            .map_err(SyncError::Records)?;
        debug!(event = %event.id, page = %record.id, "Updated record from event");
        pass.touched_sources.insert(event.id.clone());
        pass.summary.updated_targets += 1;
        Ok(())
    }

    // ========================================================================
    // Phase 2: database → calendar
    // ========================================================================

    async fn apply_target_to_source(
        &self,
        pass: &mut Pass<'_>,
        snapshot: &Snapshot,
    ) -> Result<(), SyncError> {
        let events: HashMap<&EventId, &CalendarEvent> =
            snapshot.events.iter().map(|e| (&e.id, e)).collect();

        for record in &snapshot.records {
            if let Some(event_id) = pass.mapping.source_for(&record.id) {
                if pass.touched_sources.contains(event_id) {
                    continue;
                }
                if let Some(event) = events.get(event_id).copied() {
                    self.pull_if_newer(pass, record, event).await?;
                }
                continue;
            }

            let adopted = snapshot.events.iter().find(|e| {
                pass.mapping.target_for(&e.id).is_none()
                    && translate::content_matches(e, record, &pass.binding)
            });
            if let Some(event) = adopted {
                debug!(event = %event.id, page = %record.id, "Adopting unmapped event");
                self.link(pass, &event.id, &record.id).await?;
                pass.summary.adopted += 1;
                self.pull_if_newer(pass, record, event).await?;
                continue;
            }

            let draft = match translate::record_to_draft(record, &pass.binding) {
                Ok(draft) => draft,
                Err(DomainError::MissingDate(_)) => {
                    debug!(page = %record.id, "Record has no date, not creating an event");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let created = self
                .calendar
                .create_event(&pass.pair.calendar_id, &draft)
                .await
                .map_err(SyncError::Calendar)?;
            debug!(page = %record.id, event = %created.id, title = %draft.title, "Created event");
            self.link(pass, &created.id, &record.id).await?;
            pass.created_sources.insert(created.id);
            pass.summary.created_sources += 1;
        }

        Ok(())
    }

    /// Overwrites the event when the record is strictly newer and content differs
    async fn pull_if_newer(
        &self,
        pass: &mut Pass<'_>,
        record: &DatabaseRecord,
        event: &CalendarEvent,
    ) -> Result<(), SyncError> {
        if record.updated_at <= event.updated_at
            || translate::same_content(event, record, &pass.binding)
        {
            return Ok(());
        }
        let mut draft = match translate::record_to_draft(record, &pass.binding) {
            Ok(draft) => draft,
            Err(DomainError::MissingDate(_)) => {
                warn!(page = %record.id, event = %event.id, "Record lost its date, leaving event unchanged");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if pass.binding.body.is_none() {
            let own_text = event
                .description
                .as_deref()
                .map(translate::strip_provenance);
            draft.description = Some(translate::describe_record(own_text, record));
        }
        self.calendar
            .update_event(&pass.pair.calendar_id, &event.id, &draft)
            .await
            .map_err(SyncError::Calendar)?;
        debug!(page = %record.id, event = %event.id, "Updated event from record");
        pass.summary.updated_sources += 1;
        Ok(())
    }

    // ========================================================================
    // Deletions
    // ========================================================================

    /// Removes counterparts of records that vanished from the filtered snapshot
    ///
    /// A delete that fails is logged and the entry dropped anyway.
    async fn reconcile_deletions(
        &self,
        pass: &mut Pass<'_>,
        snapshot: &Snapshot,
    ) -> Result<(), SyncError> {
        let live_events: HashSet<&EventId> = snapshot.events.iter().map(|e| &e.id).collect();
        let live_records: HashSet<&PageId> = snapshot.records.iter().map(|r| &r.id).collect();

        for (event_id, page_id) in pass.mapping.entries() {
            let source_present =
                live_events.contains(&event_id) || pass.created_sources.contains(&event_id);
            let target_present =
                live_records.contains(&page_id) || pass.created_targets.contains(&page_id);

            match (source_present, target_present) {
                (true, true) => continue,
                (false, true) => match self.records.archive_record(&page_id).await {
                    Ok(()) => {
                        debug!(event = %event_id, page = %page_id, "Archived record of deleted event");
                        pass.summary.deleted_targets += 1;
                    }
                    Err(e) => {
                        warn!(page = %page_id, error = %e, "Failed to archive record, dropping mapping");
                        pass.summary.failed_deletes += 1;
                    }
                },
                (true, false) => match self
                    .calendar
                    .delete_event(&pass.pair.calendar_id, &event_id)
                    .await
                {
                    Ok(()) => {
                        debug!(event = %event_id, page = %page_id, "Deleted event of archived record");
                        pass.summary.deleted_sources += 1;
                    }
                    Err(e) => {
                        warn!(event = %event_id, error = %e, "Failed to delete event, dropping mapping");
                        pass.summary.failed_deletes += 1;
                    }
                },
                (false, false) => {
                    debug!(event = %event_id, page = %page_id, "Both sides gone, dropping mapping");
                }
            }
            pass.mapping.unlink_source(&event_id);
        }

        Ok(())
    }
}
