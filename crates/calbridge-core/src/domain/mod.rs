//! Domain entities
//!
//! This module contains the core domain types for calbridge:
//! - Newtypes for record and collection identifiers
//! - Calendar events and their time values
//! - Database records, schemas and typed property values
//! - The per-pair identity mapping
//! - Sync pairs, jobs and statistics
//! - Domain-specific error types

pub mod errors;
pub mod event;
pub mod mapping;
pub mod newtypes;
pub mod pair;
pub mod record;
pub mod stats;

// Re-export commonly used types
pub use errors::DomainError;
pub use event::{CalendarEvent, EventDraft, EventStatus, EventTime};
pub use mapping::IdentityMapping;
pub use newtypes::*;
pub use pair::{PairKey, SyncJob, SyncPair};
pub use record::{DatabaseRecord, PropertyType, PropertyValue, SchemaBinding, TargetSchema};
pub use stats::{ReconcileSummary, SyncStats};
