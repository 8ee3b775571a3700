//! Shared test helpers for reconciliation tests
//!
//! In-memory calendar, record and key-value stores. Both record stores read
//! timestamps from one [`FakeClock`] that advances a second per write, so
//! last-writer-wins ordering is deterministic.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use calbridge_core::config::Config;
use calbridge_core::domain::{
    CalendarEvent, CalendarId, DatabaseId, DatabaseRecord, EventDraft, EventId, EventStatus,
    EventTime, PageId, PairKey, PropertyType, PropertyValue, TargetSchema,
};
use calbridge_core::ports::{ICalendarStore, IKeyValueStore, IRecordStore};
use calbridge_sync::{PairReconciler, PairStateStore, ReconcileOptions, SyncEngine};

// ============================================================================
// Clock
// ============================================================================

pub struct FakeClock {
    seconds: AtomicI64,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        Arc::new(Self {
            seconds: AtomicI64::new(start.timestamp()),
        })
    }

    pub fn tick(&self) -> DateTime<Utc> {
        let secs = self.seconds.fetch_add(1, Ordering::SeqCst) + 1;
        Utc.timestamp_opt(secs, 0).unwrap()
    }
}

fn injected(failures: &Mutex<HashMap<&'static str, String>>, op: &str) -> anyhow::Result<()> {
    match failures.lock().unwrap().get(op) {
        Some(message) => Err(anyhow::anyhow!("{message}")),
        None => Ok(()),
    }
}

// ============================================================================
// Calendar
// ============================================================================

pub struct FakeCalendar {
    clock: Arc<FakeClock>,
    events: Mutex<BTreeMap<EventId, (CalendarId, CalendarEvent)>>,
    next_id: AtomicI64,
    failures: Mutex<HashMap<&'static str, String>>,
    list_calls: AtomicUsize,
}

impl FakeCalendar {
    pub fn new(clock: Arc<FakeClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            events: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            failures: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
        })
    }

    fn insert(&self, calendar: &CalendarId, draft: &EventDraft) -> CalendarEvent {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.tick();
        let event = CalendarEvent {
            id: EventId::new(format!("evt-{n}")).unwrap(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            start: draft.start,
            end: draft.end,
            status: EventStatus::Confirmed,
            created_at: now,
            updated_at: now,
            html_link: None,
        };
        self.events
            .lock()
            .unwrap()
            .insert(event.id.clone(), (calendar.clone(), event.clone()));
        event
    }

    /// Adds an event as if a user created it in the calendar
    pub fn seed(&self, calendar: &CalendarId, title: &str, start: &str, end: &str) -> EventId {
        self.insert(
            calendar,
            &EventDraft {
                title: title.to_string(),
                description: None,
                start: EventTime::parse(start).unwrap(),
                end: EventTime::parse(end).unwrap(),
            },
        )
        .id
    }

    /// Applies a user edit and bumps `updated_at`
    pub fn edit(&self, id: &EventId, f: impl FnOnce(&mut CalendarEvent)) {
        let now = self.clock.tick();
        let mut events = self.events.lock().unwrap();
        let (_, event) = events.get_mut(id).unwrap();
        f(event);
        event.updated_at = now;
    }

    pub fn cancel(&self, id: &EventId) {
        self.edit(id, |e| e.status = EventStatus::Cancelled);
    }

    pub fn get(&self, id: &EventId) -> CalendarEvent {
        self.events.lock().unwrap()[id].1.clone()
    }

    pub fn live(&self) -> Vec<CalendarEvent> {
        self.events
            .lock()
            .unwrap()
            .values()
            .map(|(_, e)| e.clone())
            .filter(|e| e.is_live())
            .collect()
    }

    /// Number of `list_events` calls so far
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn fail(&self, op: &'static str, message: &str) {
        self.failures.lock().unwrap().insert(op, message.to_string());
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl ICalendarStore for FakeCalendar {
    async fn list_events(
        &self,
        calendar: &CalendarId,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> anyhow::Result<Vec<CalendarEvent>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        injected(&self.failures, "list_events")?;
        Ok(self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|(c, e)| {
                c == calendar && e.end.to_utc() > time_min && e.start.to_utc() < time_max
            })
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn create_event(
        &self,
        calendar: &CalendarId,
        draft: &EventDraft,
    ) -> anyhow::Result<CalendarEvent> {
        injected(&self.failures, "create_event")?;
        Ok(self.insert(calendar, draft))
    }

    async fn update_event(
        &self,
        _calendar: &CalendarId,
        id: &EventId,
        draft: &EventDraft,
    ) -> anyhow::Result<CalendarEvent> {
        injected(&self.failures, "update_event")?;
        let now = self.clock.tick();
        let mut events = self.events.lock().unwrap();
        let (_, event) = events
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {id}"))?;
        event.title = draft.title.clone();
        event.description = draft.description.clone();
        event.start = draft.start;
        event.end = draft.end;
        event.updated_at = now;
        Ok(event.clone())
    }

    async fn delete_event(&self, _calendar: &CalendarId, id: &EventId) -> anyhow::Result<()> {
        injected(&self.failures, "delete_event")?;
        let now = self.clock.tick();
        if let Some((_, event)) = self.events.lock().unwrap().get_mut(id) {
            event.status = EventStatus::Cancelled;
            event.updated_at = now;
        }
        Ok(())
    }
}

// ============================================================================
// Records
// ============================================================================

pub struct FakeRecords {
    clock: Arc<FakeClock>,
    schemas: Mutex<HashMap<DatabaseId, TargetSchema>>,
    records: Mutex<BTreeMap<PageId, (DatabaseId, DatabaseRecord)>>,
    next_id: AtomicI64,
    failures: Mutex<HashMap<&'static str, String>>,
    query_calls: AtomicUsize,
    /// Rewrites titles on engine writes, like a database formula or automation
    title_drift: Mutex<Option<fn(&str) -> String>>,
}

/// Title "Name", date "Date", rich text "Description"
pub fn standard_schema() -> TargetSchema {
    let mut properties = BTreeMap::new();
    properties.insert("Name".to_string(), PropertyType::Title);
    properties.insert("Date".to_string(), PropertyType::Date);
    properties.insert("Description".to_string(), PropertyType::RichText);
    properties.insert("Tags".to_string(), PropertyType::Other("multi_select".into()));
    TargetSchema { properties }
}

impl FakeRecords {
    pub fn new(clock: Arc<FakeClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            schemas: Mutex::new(HashMap::new()),
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            failures: Mutex::new(HashMap::new()),
            query_calls: AtomicUsize::new(0),
            title_drift: Mutex::new(None),
        })
    }

    pub fn set_schema(&self, database: &DatabaseId, schema: TargetSchema) {
        self.schemas.lock().unwrap().insert(database.clone(), schema);
    }

    fn insert(
        &self,
        database: &DatabaseId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> DatabaseRecord {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.tick();
        let record = DatabaseRecord {
            id: PageId::new(format!("page-{n}")).unwrap(),
            url: format!("https://records.test/page-{n}"),
            properties: properties.clone(),
            created_at: now,
            updated_at: now,
            archived: false,
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), (database.clone(), record.clone()));
        record
    }

    /// Adds a record as if a user created it in the database
    pub fn seed(
        &self,
        database: &DatabaseId,
        title: &str,
        date: Option<(&str, Option<&str>)>,
        body: Option<&str>,
    ) -> PageId {
        let mut properties = BTreeMap::new();
        properties.insert("Name".to_string(), PropertyValue::Title(title.to_string()));
        if let Some((start, end)) = date {
            properties.insert(
                "Date".to_string(),
                PropertyValue::Date {
                    start: EventTime::parse(start).unwrap(),
                    end: end.map(|e| EventTime::parse(e).unwrap()),
                },
            );
        }
        if let Some(body) = body {
            properties.insert(
                "Description".to_string(),
                PropertyValue::RichText(body.to_string()),
            );
        }
        self.insert(database, &properties).id
    }

    /// Applies a user edit and bumps `updated_at`
    pub fn edit(&self, id: &PageId, f: impl FnOnce(&mut DatabaseRecord)) {
        let now = self.clock.tick();
        let mut records = self.records.lock().unwrap();
        let (_, record) = records.get_mut(id).unwrap();
        f(record);
        record.updated_at = now;
    }

    pub fn set_title(&self, id: &PageId, title: &str) {
        self.edit(id, |r| {
            r.properties
                .insert("Name".to_string(), PropertyValue::Title(title.to_string()));
        });
    }

    pub fn archive(&self, id: &PageId) {
        self.edit(id, |r| r.archived = true);
    }

    pub fn get(&self, id: &PageId) -> DatabaseRecord {
        self.records.lock().unwrap()[id].1.clone()
    }

    pub fn live(&self) -> Vec<DatabaseRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .map(|(_, r)| r.clone())
            .filter(|r| !r.archived)
            .collect()
    }

    /// Number of `query_records` calls so far
    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Makes every engine create or update store `f(title)` instead of the title sent
    pub fn drift_titles(&self, f: fn(&str) -> String) {
        *self.title_drift.lock().unwrap() = Some(f);
    }

    fn drifted(&self, properties: &BTreeMap<String, PropertyValue>) -> BTreeMap<String, PropertyValue> {
        let mut properties = properties.clone();
        if let Some(f) = *self.title_drift.lock().unwrap() {
            for value in properties.values_mut() {
                if let PropertyValue::Title(title) = value {
                    *title = f(title);
                }
            }
        }
        properties
    }

    pub fn fail(&self, op: &'static str, message: &str) {
        self.failures.lock().unwrap().insert(op, message.to_string());
    }

    pub fn heal(&self) {
        self.failures.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl IRecordStore for FakeRecords {
    async fn get_schema(&self, database: &DatabaseId) -> anyhow::Result<TargetSchema> {
        injected(&self.failures, "get_schema")?;
        self.schemas
            .lock()
            .unwrap()
            .get(database)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: database {database}"))
    }

    async fn query_records(&self, database: &DatabaseId) -> anyhow::Result<Vec<DatabaseRecord>> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        injected(&self.failures, "query_records")?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|(d, r)| d == database && !r.archived)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn create_record(
        &self,
        database: &DatabaseId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> anyhow::Result<DatabaseRecord> {
        injected(&self.failures, "create_record")?;
        let properties = self.drifted(properties);
        Ok(self.insert(database, &properties))
    }

    async fn update_record(
        &self,
        page: &PageId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> anyhow::Result<DatabaseRecord> {
        injected(&self.failures, "update_record")?;
        let properties = self.drifted(properties);
        let now = self.clock.tick();
        let mut records = self.records.lock().unwrap();
        let (_, record) = records
            .get_mut(page)
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {page}"))?;
        for (name, value) in properties {
            record.properties.insert(name, value);
        }
        record.updated_at = now;
        Ok(record.clone())
    }

    async fn archive_record(&self, page: &PageId) -> anyhow::Result<()> {
        injected(&self.failures, "archive_record")?;
        let now = self.clock.tick();
        if let Some((_, record)) = self.records.lock().unwrap().get_mut(page) {
            record.archived = true;
            record.updated_at = now;
        }
        Ok(())
    }
}

// ============================================================================
// Key-value store
// ============================================================================

#[derive(Default)]
pub struct MemoryKv {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryKv {
    pub fn raw(&self, key: &str) -> Option<Value> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl IKeyValueStore for MemoryKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.values.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn pair(n: u32) -> PairKey {
    PairKey::new(
        CalendarId::new(format!("cal-{n}")).unwrap(),
        DatabaseId::new(format!("db-{n}")).unwrap(),
    )
}

pub fn since_forever() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()
}

pub struct Harness {
    pub calendar: Arc<FakeCalendar>,
    pub records: Arc<FakeRecords>,
    pub kv: Arc<MemoryKv>,
}

impl Harness {
    /// Stores for pairs 1 and 2, both databases with the standard schema
    pub fn new() -> Self {
        let clock = FakeClock::new();
        let records = FakeRecords::new(clock.clone());
        records.set_schema(&pair(1).database_id, standard_schema());
        records.set_schema(&pair(2).database_id, standard_schema());
        Self {
            calendar: FakeCalendar::new(clock),
            records,
            kv: Arc::new(MemoryKv::default()),
        }
    }

    pub fn reconciler(&self) -> PairReconciler {
        self.reconciler_with(ReconcileOptions::default())
    }

    pub fn reconciler_with(&self, options: ReconcileOptions) -> PairReconciler {
        PairReconciler::new(
            self.calendar.clone(),
            self.records.clone(),
            PairStateStore::new(self.kv.clone()),
            options,
        )
    }

    pub fn engine(&self) -> SyncEngine {
        self.engine_with(&Config::default())
    }

    pub fn engine_with(&self, config: &Config) -> SyncEngine {
        SyncEngine::new(
            self.calendar.clone(),
            self.records.clone(),
            self.kv.clone(),
            config,
        )
    }
}
