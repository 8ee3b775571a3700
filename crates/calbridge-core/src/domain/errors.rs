//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including identifier validation, date parsing, schema binding and
//! identity-mapping invariant violations.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Identifier was empty or malformed
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// A date or date-time string could not be parsed
    #[error("Invalid date value: {0}")]
    InvalidDate(String),

    /// The database schema lacks a property the engine depends on
    #[error("Schema is missing a {kind} property")]
    MissingProperty {
        /// Which role could not be bound (`title` or `date`)
        kind: String,
    },

    /// A record has no value for its bound date property
    #[error("Record {0} has no date value")]
    MissingDate(String),

    /// Linking two ids would break the one-to-one mapping
    #[error("Mapping conflict: {source_id} <-> {target_id}")]
    MappingConflict {
        /// Calendar event id of the rejected link
        source_id: String,
        /// Database record id of the rejected link
        target_id: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
