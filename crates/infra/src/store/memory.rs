use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;

use agencyhub_core::{AgencyId, ExpectedVersion, RecordId};

use super::{Collection, RecordStore, StoreError, StoredRecord};

type Key = (AgencyId, Collection, RecordId);

/// In-memory agency-isolated record store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<BTreeMap<Key, StoredRecord>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&(agency_id, collection, record_id)).cloned())
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
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let key = (agency_id, collection, record_id);
        let current = map.get(&key).map(|r| r.version).unwrap_or(0);

        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "{collection} {record_id}: expected {expected:?}, found version {current}"
            )));
        }
        if version <= current {
            return Err(StoreError::Concurrency(format!(
                "{collection} {record_id}: version {version} does not advance {current}"
            )));
        }

        let record = StoredRecord {
            agency_id,
            collection: collection.as_str().to_string(),
            record_id,
            version,
            body,
            updated_at: Utc::now(),
        };
        map.insert(key, record.clone());
        Ok(record)
    }

    async fn list(
        &self,
        agency_id: AgencyId,
        collection: Collection,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .iter()
            .filter(|((a, c, _), _)| *a == agency_id && *c == collection)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn delete(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(&(agency_id, collection, record_id)).is_some())
    }

    async fn count(&self, agency_id: AgencyId, collection: Collection) -> Result<u64, StoreError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map
            .keys()
            .filter(|(a, c, _)| *a == agency_id && *c == collection)
            .count() as u64)
    }

    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let before = map.len();
        map.retain(|(a, _, _), _| *a != agency_id);
        Ok((before - map.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn put_requires_the_expected_version() {
        let store = InMemoryRecordStore::new();
        let agency = AgencyId::new();
        let id = RecordId::new();

        let first = store
            .put(agency, Collection::LEADS, id, 1, json!({"n": 1}), ExpectedVersion::Exact(0))
            .await
            .unwrap();
        assert_eq!(first.version, 1);

        let stale = store
            .put(agency, Collection::LEADS, id, 2, json!({"n": 2}), ExpectedVersion::Exact(0))
            .await;
        assert!(matches!(stale, Err(StoreError::Concurrency(_))));

        store
            .put(agency, Collection::LEADS, id, 3, json!({"n": 3}), ExpectedVersion::Exact(1))
            .await
            .unwrap();
        let got = store.get(agency, Collection::LEADS, id).await.unwrap().unwrap();
        assert_eq!(got.version, 3);
        assert_eq!(got.body, json!({"n": 3}));
    }

    #[tokio::test]
    async fn version_must_advance_even_with_any() {
        let store = InMemoryRecordStore::new();
        let agency = AgencyId::new();
        let id = RecordId::new();
        store
            .put(agency, Collection::USERS, id, 2, json!({}), ExpectedVersion::Any)
            .await
            .unwrap();
        let res = store
            .put(agency, Collection::USERS, id, 2, json!({}), ExpectedVersion::Any)
            .await;
        assert!(matches!(res, Err(StoreError::Concurrency(_))));
    }

    #[tokio::test]
    async fn agencies_and_collections_are_isolated() {
        let store = InMemoryRecordStore::new();
        let a = AgencyId::new();
        let b = AgencyId::new();
        let id = RecordId::new();

        store
            .put(a, Collection::LEADS, id, 1, json!("a"), ExpectedVersion::Exact(0))
            .await
            .unwrap();
        store
            .put(b, Collection::LEADS, RecordId::new(), 1, json!("b"), ExpectedVersion::Exact(0))
            .await
            .unwrap();
        store
            .put(a, Collection::PROJECTS, RecordId::new(), 1, json!("p"), ExpectedVersion::Exact(0))
            .await
            .unwrap();

        assert!(store.get(b, Collection::LEADS, id).await.unwrap().is_none());
        assert_eq!(store.list(a, Collection::LEADS).await.unwrap().len(), 1);
        assert_eq!(store.count(a, Collection::PROJECTS).await.unwrap(), 1);

        assert_eq!(store.clear_agency(a).await.unwrap(), 2);
        assert_eq!(store.count(a, Collection::LEADS).await.unwrap(), 0);
        assert_eq!(store.count(b, Collection::LEADS).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_reports_whether_anything_was_removed() {
        let store = InMemoryRecordStore::new();
        let agency = AgencyId::new();
        let id = RecordId::new();
        store
            .put(agency, Collection::CLIENTS, id, 1, json!({}), ExpectedVersion::Exact(0))
            .await
            .unwrap();
        assert!(store.delete(agency, Collection::CLIENTS, id).await.unwrap());
        assert!(!store.delete(agency, Collection::CLIENTS, id).await.unwrap());
    }
}
