//! Agency-scoped record storage.
//!
//! Every business object (aggregate snapshot or plain record) is stored as a
//! JSON document addressed by `(agency_id, collection, record_id)` and
//! carries a version used for optimistic concurrency. Backends:
//!
//! - [`InMemoryRecordStore`] for tests and database-less development
//! - [`PostgresRecordStore`] over the `records` table (JSONB body)

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use agencyhub_core::{AgencyId, ExpectedVersion, RecordId};

pub use memory::InMemoryRecordStore;
pub use postgres::PostgresRecordStore;
pub(crate) use postgres::map_sqlx_error;

/// Name of a record collection (one per entity type).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Collection(&'static str);

impl Collection {
    pub const LEADS: Collection = Collection("crm.leads");
    pub const CLIENTS: Collection = Collection("crm.clients");
    pub const PROJECTS: Collection = Collection("projects.projects");
    pub const DEPARTMENTS: Collection = Collection("hr.departments");
    pub const EMPLOYEES: Collection = Collection("hr.employees");
    pub const CHARTS: Collection = Collection("accounting.charts");
    pub const JOURNAL: Collection = Collection("accounting.journal");
    pub const INVOICES: Collection = Collection("invoicing.invoices");
    pub const USERS: Collection = Collection("system.users");
    /// Lives in the platform namespace (`AgencyId::platform()`).
    pub const AGENCIES: Collection = Collection("system.agencies");

    /// Collections that hold an agency's own data.
    pub const AGENCY_DATA: [Collection; 9] = [
        Collection::LEADS,
        Collection::CLIENTS,
        Collection::PROJECTS,
        Collection::DEPARTMENTS,
        Collection::EMPLOYEES,
        Collection::CHARTS,
        Collection::JOURNAL,
        Collection::INVOICES,
        Collection::USERS,
    ];

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl core::fmt::Display for Collection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.0)
    }
}

/// A persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub agency_id: AgencyId,
    pub collection: String,
    pub record_id: RecordId,
    /// Always > 0 for stored records; 0 means "does not exist".
    pub version: u64,
    pub body: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            StoreError::Serialization(format!(
                "{} {}: {e}",
                self.collection, self.record_id
            ))
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Optimistic concurrency failure (stale version or concurrent write).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The backing database failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Agency-isolated document store with optimistic versions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<Option<StoredRecord>, StoreError>;

    /// Insert or replace a record at `version`.
    ///
    /// `expected` is checked against the current version (0 when absent).
    async fn put(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
        version: u64,
        body: JsonValue,
        expected: ExpectedVersion,
    ) -> Result<StoredRecord, StoreError>;

    /// All records of a collection, oldest id first.
    async fn list(
        &self,
        agency_id: AgencyId,
        collection: Collection,
    ) -> Result<Vec<StoredRecord>, StoreError>;

    /// Returns whether a record was removed.
    async fn delete(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<bool, StoreError>;

    async fn count(&self, agency_id: AgencyId, collection: Collection) -> Result<u64, StoreError> {
        Ok(self.list(agency_id, collection).await?.len() as u64)
    }

    /// Remove every record of an agency. Returns the number removed.
    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError>;

    /// Cheap liveness check for `/health`.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl<S> RecordStore for Arc<S>
where
    S: RecordStore + ?Sized,
{
    async fn get(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<Option<StoredRecord>, StoreError> {
        (**self).get(agency_id, collection, record_id).await
    }

    async fn put(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
        version: u64,
        body: JsonValue,
        expected: ExpectedVersion,
    ) -> Result<StoredRecord, StoreError> {
        (**self)
            .put(agency_id, collection, record_id, version, body, expected)
            .await
    }

    async fn list(
        &self,
        agency_id: AgencyId,
        collection: Collection,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).list(agency_id, collection).await
    }

    async fn delete(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<bool, StoreError> {
        (**self).delete(agency_id, collection, record_id).await
    }

    async fn count(&self, agency_id: AgencyId, collection: Collection) -> Result<u64, StoreError> {
        (**self).count(agency_id, collection).await
    }

    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError> {
        (**self).clear_agency(agency_id).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        (**self).ping().await
    }
}

/// Load and decode a plain record together with its version.
pub async fn load_record<T: DeserializeOwned>(
    store: &dyn RecordStore,
    agency_id: AgencyId,
    collection: Collection,
    record_id: RecordId,
) -> Result<Option<(T, u64)>, StoreError> {
    match store.get(agency_id, collection, record_id).await? {
        Some(record) => Ok(Some((record.decode()?, record.version))),
        None => Ok(None),
    }
}

/// Decode every record of a collection.
pub async fn list_records<T: DeserializeOwned>(
    store: &dyn RecordStore,
    agency_id: AgencyId,
    collection: Collection,
) -> Result<Vec<T>, StoreError> {
    store
        .list(agency_id, collection)
        .await?
        .iter()
        .map(StoredRecord::decode)
        .collect()
}

/// Write a plain record as the successor of `current_version`.
pub async fn save_record<T: Serialize + Sync>(
    store: &dyn RecordStore,
    agency_id: AgencyId,
    collection: Collection,
    record_id: RecordId,
    value: &T,
    current_version: u64,
) -> Result<u64, StoreError> {
    let body = serde_json::to_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let stored = store
        .put(
            agency_id,
            collection,
            record_id,
            current_version + 1,
            body,
            ExpectedVersion::Exact(current_version),
        )
        .await?;
    Ok(stored.version)
}
