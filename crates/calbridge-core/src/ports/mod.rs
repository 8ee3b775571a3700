//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. The reconciliation engine depends on these
//! interfaces; their implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ICalendarStore`] - Calendar event listing and writes
//! - [`IRecordStore`] - Database schema, record queries and writes
//! - [`IKeyValueStore`] - Durable JSON key-value storage for engine state

pub mod calendar_store;
pub mod key_value_store;
pub mod record_store;

pub use calendar_store::ICalendarStore;
pub use key_value_store::IKeyValueStore;
pub use record_store::IRecordStore;
