//! Postgres-backed record store.
//!
//! ## Error mapping
//!
//! | SQLx error | code | `StoreError` |
//! |---|---|---|
//! | unique violation | `23505` | `Concurrency` (concurrent insert of the same record) |
//! | any other database error | * | `Backend` |
//! | pool closed / io / other | n/a | `Backend` |
//!
//! Every statement filters on `agency_id`; the table never answers a query
//! without it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};
use tracing::instrument;

use agencyhub_core::{AgencyId, ExpectedVersion, RecordId};

use super::{Collection, RecordStore, StoreError, StoredRecord};

#[derive(Debug, Clone)]
pub struct PostgresRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn from_shared(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<StoredRecord, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Backend(format!("failed to decode record row: {e}"));
    let agency: uuid::Uuid = row.try_get("agency_id").map_err(decode)?;
    let record: uuid::Uuid = row.try_get("record_id").map_err(decode)?;
    let version: i64 = row.try_get("version").map_err(decode)?;
    Ok(StoredRecord {
        agency_id: AgencyId::from_uuid(agency),
        collection: row.try_get("collection").map_err(decode)?,
        record_id: RecordId::from_uuid(record),
        version: u64::try_from(version)
            .map_err(|_| StoreError::Backend(format!("negative record version {version}")))?,
        body: row.try_get::<JsonValue, _>("body").map_err(decode)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode)?,
    })
}

fn to_i64(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Backend(format!("version {version} out of range")))
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[instrument(
        skip(self),
        fields(agency_id = %agency_id, collection = %collection, record_id = %record_id),
        err
    )]
    async fn get(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<Option<StoredRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT agency_id, collection, record_id, version, body, updated_at
            FROM records
            WHERE agency_id = $1 AND collection = $2 AND record_id = $3
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(collection.as_str())
        .bind(record_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_record", e))?;

        row.as_ref().map(row_to_record).transpose()
    }

    #[instrument(
        skip(self, body),
        fields(
            agency_id = %agency_id,
            collection = %collection,
            record_id = %record_id,
            expected = ?expected
        ),
        err
    )]
    async fn put(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
        version: u64,
        body: JsonValue,
        expected: ExpectedVersion,
    ) -> Result<StoredRecord, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT version FROM records
            WHERE agency_id = $1 AND collection = $2 AND record_id = $3
            FOR UPDATE
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(collection.as_str())
        .bind(record_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_record", e))?;

        let current_version = current.map(|v| v.max(0) as u64).unwrap_or(0);
        if !expected.matches(current_version) || version <= current_version {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "{collection} {record_id}: expected {expected:?}, found version {current_version}"
            )));
        }

        let row = if current.is_some() {
            sqlx::query(
                r#"
                UPDATE records
                SET version = $4, body = $5, updated_at = now()
                WHERE agency_id = $1 AND collection = $2 AND record_id = $3
                RETURNING agency_id, collection, record_id, version, body, updated_at
                "#,
            )
        } else {
            sqlx::query(
                r#"
                INSERT INTO records (agency_id, collection, record_id, version, body, updated_at)
                VALUES ($1, $2, $3, $4, $5, now())
                RETURNING agency_id, collection, record_id, version, body, updated_at
                "#,
            )
        }
        .bind(agency_id.as_uuid())
        .bind(collection.as_str())
        .bind(record_id.as_uuid())
        .bind(to_i64(version)?)
        .bind(&body)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("write_record", e))?;

        let stored = row_to_record(&row)?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(agency_id = %agency_id, collection = %collection), err)]
    async fn list(
        &self,
        agency_id: AgencyId,
        collection: Collection,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT agency_id, collection, record_id, version, body, updated_at
            FROM records
            WHERE agency_id = $1 AND collection = $2
            ORDER BY record_id ASC
            "#,
        )
        .bind(agency_id.as_uuid())
        .bind(collection.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_records", e))?;

        rows.iter().map(row_to_record).collect()
    }

    #[instrument(
        skip(self),
        fields(agency_id = %agency_id, collection = %collection, record_id = %record_id),
        err
    )]
    async fn delete(
        &self,
        agency_id: AgencyId,
        collection: Collection,
        record_id: RecordId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "DELETE FROM records WHERE agency_id = $1 AND collection = $2 AND record_id = $3",
        )
        .bind(agency_id.as_uuid())
        .bind(collection.as_str())
        .bind(record_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("delete_record", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(agency_id = %agency_id, collection = %collection), err)]
    async fn count(&self, agency_id: AgencyId, collection: Collection) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM records WHERE agency_id = $1 AND collection = $2",
        )
        .bind(agency_id.as_uuid())
        .bind(collection.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("count_records", e))?;
        Ok(count.max(0) as u64)
    }

    #[instrument(skip(self), fields(agency_id = %agency_id), err)]
    async fn clear_agency(&self, agency_id: AgencyId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE agency_id = $1")
            .bind(agency_id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("clear_agency", e))?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ping", e))?;
        Ok(())
    }
}

/// Map a SQLx error to a store error, tagging it with the failed operation.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}
