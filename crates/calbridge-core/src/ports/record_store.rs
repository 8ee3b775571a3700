//! Record store port (driven/secondary port)
//!
//! The record store has user-defined schemas; the engine introspects the
//! schema on every pass and writes only the properties it declares.

use std::collections::BTreeMap;

use crate::domain::{DatabaseId, DatabaseRecord, PageId, PropertyValue, TargetSchema};

/// Port trait for the database side of a pair
#[async_trait::async_trait]
pub trait IRecordStore: Send + Sync {
    /// Fetches the property schema of a database
    async fn get_schema(&self, database: &DatabaseId) -> anyhow::Result<TargetSchema>;

    /// Returns every non-archived record of the database
    async fn query_records(&self, database: &DatabaseId) -> anyhow::Result<Vec<DatabaseRecord>>;

    /// Creates a record with the given property values
    async fn create_record(
        &self,
        database: &DatabaseId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> anyhow::Result<DatabaseRecord>;

    /// Overwrites the given properties of a record, leaving others untouched
    async fn update_record(
        &self,
        page: &PageId,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> anyhow::Result<DatabaseRecord>;

    /// Archives (soft-deletes) a record
    async fn archive_record(&self, page: &PageId) -> anyhow::Result<()>;
}
