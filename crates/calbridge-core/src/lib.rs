//! Calbridge Core - Domain types and ports for calendar/database reconciliation
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `CalendarEvent`, `DatabaseRecord`, `IdentityMapping`, `SyncPair`, `SyncStats`
//! - **Record translation** - pure conversions between calendar events and database records
//! - **Port definitions** - Traits for adapters: `ICalendarStore`, `IRecordStore`, `IKeyValueStore`
//! - **Configuration** - the YAML configuration file and its validation
//!
//! # Architecture
//!
//! The domain module contains pure data types with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The reconciliation engine in `calbridge-sync` drives both through the ports.

pub mod config;
pub mod domain;
pub mod ports;
pub mod translate;
