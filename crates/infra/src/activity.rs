//! Append-only activity log.
//!
//! Every command handled by the dispatcher leaves one entry per emitted
//! event, so an agency can see who changed what and when.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};
use uuid::Uuid;

use agencyhub_core::{AgencyId, RecordId, UserId};
use agencyhub_events::{AgencyScoped, EventEnvelope};

use crate::store::StoreError;

/// One activity log entry.
pub type ActivityEntry = EventEnvelope<JsonValue>;

#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Append entries atomically. Entries must all belong to one agency.
    async fn append(&self, entries: &[ActivityEntry]) -> Result<(), StoreError>;

    /// Entries of one record, oldest first.
    async fn list_for_record(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
    ) -> Result<Vec<ActivityEntry>, StoreError>;

    /// Most recent entries of an agency, newest first.
    async fn recent(&self, agency_id: AgencyId, limit: usize)
        -> Result<Vec<ActivityEntry>, StoreError>;

    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError>;
}

#[async_trait]
impl<S> ActivityLog for Arc<S>
where
    S: ActivityLog + ?Sized,
{
    async fn append(&self, entries: &[ActivityEntry]) -> Result<(), StoreError> {
        (**self).append(entries).await
    }

    async fn list_for_record(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        (**self).list_for_record(agency_id, record_id).await
    }

    async fn recent(
        &self,
        agency_id: AgencyId,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        (**self).recent(agency_id, limit).await
    }

    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError> {
        (**self).clear_agency(agency_id).await
    }
}

fn single_agency(entries: &[ActivityEntry]) -> Result<Option<AgencyId>, StoreError> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };
    let agency = first.agency_id();
    if entries.iter().any(|e| AgencyScoped::agency_id(e) != agency) {
        return Err(StoreError::Backend(
            "activity batch spans multiple agencies".to_string(),
        ));
    }
    Ok(Some(agency))
}

/// In-memory activity log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryActivityLog {
    entries: RwLock<Vec<ActivityEntry>>,
}

impl InMemoryActivityLog {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("activity log lock poisoned".to_string())
}

#[async_trait]
impl ActivityLog for InMemoryActivityLog {
    async fn append(&self, entries: &[ActivityEntry]) -> Result<(), StoreError> {
        if single_agency(entries)?.is_none() {
            return Ok(());
        }
        let mut log = self.entries.write().map_err(|_| poisoned())?;
        for entry in entries {
            let duplicate = log.iter().any(|e| {
                e.agency_id() == entry.agency_id()
                    && e.record_id() == entry.record_id()
                    && e.sequence_number() == entry.sequence_number()
            });
            if duplicate {
                return Err(StoreError::Concurrency(format!(
                    "activity entry {} #{} already recorded",
                    entry.record_id(),
                    entry.sequence_number()
                )));
            }
        }
        log.extend(entries.iter().cloned());
        Ok(())
    }

    async fn list_for_record(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let log = self.entries.read().map_err(|_| poisoned())?;
        let mut out: Vec<_> = log
            .iter()
            .filter(|e| e.agency_id() == agency_id && e.record_id() == record_id)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.sequence_number());
        Ok(out)
    }

    async fn recent(
        &self,
        agency_id: AgencyId,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let log = self.entries.read().map_err(|_| poisoned())?;
        Ok(log
            .iter()
            .rev()
            .filter(|e| e.agency_id() == agency_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError> {
        let mut log = self.entries.write().map_err(|_| poisoned())?;
        let before = log.len();
        log.retain(|e| e.agency_id() != agency_id);
        Ok((before - log.len()) as u64)
    }
}

/// Postgres activity log over the `activity_log` table.
#[derive(Debug, Clone)]
pub struct PostgresActivityLog {
    pool: Arc<PgPool>,
}

impl PostgresActivityLog {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<ActivityEntry, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode activity row: {e}"));
    let sequence: i64 = row.try_get("sequence_number").map_err(decode)?;
    let actor: Option<uuid::Uuid> = row.try_get("actor").map_err(decode)?;
    Ok(EventEnvelope::new(
        row.try_get("event_id").map_err(decode)?,
        AgencyId::from_uuid(row.try_get("agency_id").map_err(decode)?),
        RecordId::from_uuid(row.try_get("record_id").map_err(decode)?),
        row.try_get::<String, _>("record_type").map_err(decode)?,
        sequence.max(0) as u64,
        row.try_get::<String, _>("event_type").map_err(decode)?,
        row.try_get::<DateTime<Utc>, _>("occurred_at").map_err(decode)?,
        actor.map(UserId::from_uuid),
        row.try_get::<JsonValue, _>("payload").map_err(decode)?,
    ))
}

const SELECT_COLUMNS: &str = "event_id, agency_id, record_id, record_type, sequence_number, \
     event_type, occurred_at, actor, payload";

#[async_trait]
impl ActivityLog for PostgresActivityLog {
    #[instrument(skip(self, entries), fields(entry_count = entries.len()), err)]
    async fn append(&self, entries: &[ActivityEntry]) -> Result<(), StoreError> {
        if single_agency(entries)?.is_none() {
            return Ok(());
        }
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| crate::store::map_sqlx_error("begin_transaction", e))?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO activity_log (
                    event_id, agency_id, record_id, record_type, sequence_number,
                    event_type, occurred_at, actor, payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(entry.event_id())
            .bind(entry.agency_id().as_uuid())
            .bind(entry.record_id().as_uuid())
            .bind(entry.record_type())
            .bind(entry.sequence_number() as i64)
            .bind(entry.event_type())
            .bind(entry.occurred_at())
            .bind(entry.actor().map(Uuid::from))
            .bind(entry.payload())
            .execute(&mut *tx)
            .await
            .map_err(|e| crate::store::map_sqlx_error("insert_activity", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| crate::store::map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), fields(agency_id = %agency_id, record_id = %record_id), err)]
    async fn list_for_record(
        &self,
        agency_id: AgencyId,
        record_id: RecordId,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM activity_log \
             WHERE agency_id = $1 AND record_id = $2 ORDER BY sequence_number ASC"
        ))
        .bind(agency_id.as_uuid())
        .bind(record_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| crate::store::map_sqlx_error("list_activity", e))?;

        collect_scoped(agency_id, &rows)
    }

    #[instrument(skip(self), fields(agency_id = %agency_id), err)]
    async fn recent(
        &self,
        agency_id: AgencyId,
        limit: usize,
    ) -> Result<Vec<ActivityEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM activity_log \
             WHERE agency_id = $1 ORDER BY recorded_at DESC, sequence_number DESC LIMIT $2"
        ))
        .bind(agency_id.as_uuid())
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| crate::store::map_sqlx_error("recent_activity", e))?;

        collect_scoped(agency_id, &rows)
    }

    #[instrument(skip(self), fields(agency_id = %agency_id), err)]
    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM activity_log WHERE agency_id = $1")
            .bind(agency_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| crate::store::map_sqlx_error("clear_activity", e))?;
        Ok(result.rows_affected())
    }
}

fn collect_scoped(
    agency_id: AgencyId,
    rows: &[sqlx::postgres::PgRow],
) -> Result<Vec<ActivityEntry>, StoreError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let entry = row_to_entry(row)?;
        if AgencyScoped::agency_id(&entry) != agency_id {
            warn!(expected = %agency_id, "dropping activity entry from another agency");
            continue;
        }
        out.push(entry);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn entry(agency: AgencyId, record: RecordId, seq: u64) -> ActivityEntry {
        EventEnvelope::new(
            Uuid::now_v7(),
            agency,
            record,
            "crm.lead",
            seq,
            "crm.lead.created",
            Utc::now(),
            None,
            json!({ "seq": seq }),
        )
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_scoped() {
        let log = InMemoryActivityLog::new();
        let a = AgencyId::new();
        let b = AgencyId::new();
        let record = RecordId::new();

        log.append(&[entry(a, record, 1), entry(a, record, 2)]).await.unwrap();
        log.append(&[entry(b, RecordId::new(), 1)]).await.unwrap();
        log.append(&[entry(a, record, 3)]).await.unwrap();

        let recent = log.recent(a, 2).await.unwrap();
        let seqs: Vec<u64> = recent.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![3, 2]);

        assert_eq!(log.list_for_record(a, record).await.unwrap().len(), 3);
        assert_eq!(log.clear_agency(a).await.unwrap(), 3);
        assert_eq!(log.recent(b, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_sequence_is_a_conflict() {
        let log = InMemoryActivityLog::new();
        let a = AgencyId::new();
        let record = RecordId::new();
        log.append(&[entry(a, record, 1)]).await.unwrap();
        let err = log.append(&[entry(a, record, 1)]).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[tokio::test]
    async fn mixed_agency_batches_are_rejected() {
        let log = InMemoryActivityLog::new();
        let err = log
            .append(&[
                entry(AgencyId::new(), RecordId::new(), 1),
                entry(AgencyId::new(), RecordId::new(), 1),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }
}
