//! Postgres-backed warehouse store implementation.
//!
//! Records are persisted as JSONB snapshots with a version column; a write
//! set commits inside one SQL transaction with version-guarded updates, so
//! concurrent operations touching the same record serialize at the database.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Insert of an already registered container/shelf |
//! | Database (other) | Any other | `Backend` | Other database errors |
//! | RowNotFound | N/A | `NotFound` | Commit against a record that was never inserted |
//! | Other | N/A | `Backend` | Network errors, pool failures, etc. |
//!
//! Version mismatches are detected explicitly (SELECT ... FOR UPDATE before
//! the UPDATE) and surface as `Concurrency` after the transaction rolls
//! back.
//!
//! ## Thread Safety
//!
//! `PostgresWarehouseStore` is `Send + Sync`; all operations go through the
//! SQLx connection pool.

use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use harvesthub_core::{CenterId, ContainerCode, ExpectedVersion, ShelfId, VersionedRecord};
use harvesthub_warehouse::{ContainerRecord, ShelfRecord, ShelfType};

use super::r#trait::{
    OccupancyQuery, ShelfOccupancySummary, StoreError, WarehouseStore, WriteSet,
};

/// Postgres-backed warehouse store.
///
/// ## Optimistic Concurrency
///
/// `commit_write_set` runs one transaction that, per record:
/// 1. locks the stored row (`SELECT ... FOR UPDATE`)
/// 2. validates the stored version against the expectation
/// 3. writes the new snapshot with `version = version + 1`
///
/// Any mismatch rolls the whole transaction back and returns
/// [`StoreError::Concurrency`]; the engine retries from a fresh load.
#[derive(Debug, Clone)]
pub struct PostgresWarehouseStore {
    pool: Arc<PgPool>,
}

impl PostgresWarehouseStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the backing tables when they do not exist yet (dev/test
    /// convenience; production uses migrations).
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS containers (
                center_id UUID NOT NULL,
                code UUID NOT NULL UNIQUE,
                version BIGINT NOT NULL,
                record JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (center_id, code)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema_containers", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shelves (
                center_id UUID NOT NULL,
                shelf_id UUID NOT NULL,
                shelf_type TEXT NOT NULL,
                seq BIGSERIAL,
                version BIGINT NOT NULL,
                record JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (center_id, shelf_id)
            )
            "#,
        )
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema_shelves", e))?;

        Ok(())
    }

    #[instrument(skip(self, record), fields(code = %record.code()), err)]
    pub async fn insert_container_record(
        &self,
        record: ContainerRecord,
    ) -> Result<(), StoreError> {
        let payload = to_json("container", &record)?;
        sqlx::query(
            r#"
            INSERT INTO containers (center_id, code, version, record)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(record.center_id().as_uuid())
        .bind(record.code().as_uuid())
        .bind(record.version() as i64)
        .bind(payload)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_container", e))?;
        Ok(())
    }

    #[instrument(skip(self, record), fields(shelf_id = %record.shelf_id()), err)]
    pub async fn insert_shelf_record(&self, record: ShelfRecord) -> Result<(), StoreError> {
        let payload = to_json("shelf", &record)?;
        sqlx::query(
            r#"
            INSERT INTO shelves (center_id, shelf_id, shelf_type, version, record)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.center_id().as_uuid())
        .bind(record.shelf_id().as_uuid())
        .bind(record.shelf_type().to_string())
        .bind(record.version() as i64)
        .bind(payload)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_shelf", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(code = %code), err)]
    pub async fn load_container(
        &self,
        center_id: CenterId,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        let row = sqlx::query(
            r#"SELECT record FROM containers WHERE center_id = $1 AND code = $2"#,
        )
        .bind(center_id.as_uuid())
        .bind(code.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_container", e))?;

        row.map(|r| from_json_row("container", &r)).transpose()
    }

    #[instrument(skip(self), fields(code = %code), err)]
    pub async fn find_container_by_code(
        &self,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        let row = sqlx::query(r#"SELECT record FROM containers WHERE code = $1"#)
            .bind(code.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_container", e))?;

        row.map(|r| from_json_row("container", &r)).transpose()
    }

    #[instrument(skip(self), fields(shelf_id = %shelf_id), err)]
    pub async fn load_shelf(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<Option<ShelfRecord>, StoreError> {
        let row = sqlx::query(
            r#"SELECT record FROM shelves WHERE center_id = $1 AND shelf_id = $2"#,
        )
        .bind(center_id.as_uuid())
        .bind(shelf_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_shelf", e))?;

        row.map(|r| from_json_row("shelf", &r)).transpose()
    }

    #[instrument(skip(self), fields(shelf_type = %shelf_type), err)]
    pub async fn load_shelves_by_type(
        &self,
        center_id: CenterId,
        shelf_type: ShelfType,
    ) -> Result<Vec<ShelfRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM shelves
            WHERE center_id = $1 AND shelf_type = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(center_id.as_uuid())
        .bind(shelf_type.to_string())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_shelves_by_type", e))?;

        rows.iter().map(|r| from_json_row("shelf", r)).collect()
    }

    /// Apply a write set in one transaction with version-guarded updates.
    #[instrument(
        skip(self, write_set),
        fields(
            containers = write_set.containers().len(),
            shelves = write_set.shelves().len()
        ),
        err
    )]
    pub async fn commit_write_set(&self, write_set: WriteSet) -> Result<(), StoreError> {
        if write_set.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (containers, shelves) = write_set.into_parts();

        for (mut record, expected) in containers {
            let stored_version = lock_row_version(
                &mut tx,
                r#"SELECT version FROM containers WHERE center_id = $1 AND code = $2 FOR UPDATE"#,
                record.center_id().as_uuid(),
                record.code().as_uuid(),
            )
            .await?;

            let Some(stored) = stored_version else {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::NotFound(format!(
                    "container {} was never inserted",
                    record.code()
                )));
            };
            if !expected.matches(stored) {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Concurrency(format!(
                    "container {}: expected {:?}, found {}",
                    record.code(),
                    expected,
                    stored
                )));
            }

            record.touch();
            let payload = to_json("container", &record)?;
            sqlx::query(
                r#"
                UPDATE containers
                SET record = $3, version = $4, updated_at = now()
                WHERE center_id = $1 AND code = $2
                "#,
            )
            .bind(record.center_id().as_uuid())
            .bind(record.code().as_uuid())
            .bind(payload)
            .bind(record.version() as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_container", e))?;
        }

        for (mut record, expected) in shelves {
            let stored_version = lock_row_version(
                &mut tx,
                r#"SELECT version FROM shelves WHERE center_id = $1 AND shelf_id = $2 FOR UPDATE"#,
                record.center_id().as_uuid(),
                record.shelf_id().as_uuid(),
            )
            .await?;

            let Some(stored) = stored_version else {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::NotFound(format!(
                    "shelf {} was never inserted",
                    record.shelf_id()
                )));
            };
            if !expected.matches(stored) {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(StoreError::Concurrency(format!(
                    "shelf {}: expected {:?}, found {}",
                    record.shelf_id(),
                    expected,
                    stored
                )));
            }

            record.touch();
            let payload = to_json("shelf", &record)?;
            sqlx::query(
                r#"
                UPDATE shelves
                SET record = $3, version = $4, updated_at = now()
                WHERE center_id = $1 AND shelf_id = $2
                "#,
            )
            .bind(record.center_id().as_uuid())
            .bind(record.shelf_id().as_uuid())
            .bind(payload)
            .bind(record.version() as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_shelf", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

async fn lock_row_version(
    tx: &mut Transaction<'_, Postgres>,
    query: &str,
    key_a: &uuid::Uuid,
    key_b: &uuid::Uuid,
) -> Result<Option<u64>, StoreError> {
    let row = sqlx::query(query)
        .bind(key_a)
        .bind(key_b)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_row", e))?;

    Ok(row.map(|r| r.get::<i64, _>("version") as u64))
}

fn to_json<T: serde::Serialize>(kind: &str, record: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(record)
        .map_err(|e| StoreError::Serialization(format!("{kind} encode failed: {e}")))
}

fn from_json_row<T: serde::de::DeserializeOwned>(
    kind: &str,
    row: &sqlx::postgres::PgRow,
) -> Result<T, StoreError> {
    let value: serde_json::Value = row
        .try_get("record")
        .map_err(|e| StoreError::Backend(format!("{kind} row read failed: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| StoreError::Serialization(format!("{kind} decode failed: {e}")))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e.as_database_error().and_then(|db| db.code()),
        Some(code) if code == "23505"
    )
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> StoreError {
    if is_unique_violation(&e) {
        return StoreError::Duplicate(format!("{operation}: {e}"));
    }
    match e {
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("{operation}: row not found")),
        other => StoreError::Backend(format!("{operation}: {other}")),
    }
}

// Implement the synchronous WarehouseStore trait on top of the async
// methods, the same way callers inside a tokio runtime use the store.

fn runtime_handle() -> Result<tokio::runtime::Handle, StoreError> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::Backend(
            "PostgresWarehouseStore requires an async runtime (tokio). Ensure you're calling from within a tokio runtime context.".to_string(),
        )
    })
}

impl WarehouseStore for PostgresWarehouseStore {
    fn insert_container(&self, record: ContainerRecord) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.insert_container_record(record))
    }

    fn insert_shelf(&self, record: ShelfRecord) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.insert_shelf_record(record))
    }

    fn container(
        &self,
        center_id: CenterId,
        code: ContainerCode,
    ) -> Result<Option<ContainerRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_container(center_id, code))
    }

    fn find_container(&self, code: ContainerCode) -> Result<Option<ContainerRecord>, StoreError> {
        runtime_handle()?.block_on(self.find_container_by_code(code))
    }

    fn shelf(
        &self,
        center_id: CenterId,
        shelf_id: ShelfId,
    ) -> Result<Option<ShelfRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_shelf(center_id, shelf_id))
    }

    fn shelves_by_type(
        &self,
        center_id: CenterId,
        shelf_type: ShelfType,
    ) -> Result<Vec<ShelfRecord>, StoreError> {
        runtime_handle()?.block_on(self.load_shelves_by_type(center_id, shelf_type))
    }

    fn commit(&self, write_set: WriteSet) -> Result<(), StoreError> {
        runtime_handle()?.block_on(self.commit_write_set(write_set))
    }
}

#[async_trait::async_trait]
impl OccupancyQuery for PostgresWarehouseStore {
    async fn shelf_occupancy(
        &self,
        center_id: CenterId,
    ) -> Result<Vec<ShelfOccupancySummary>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT record FROM shelves WHERE center_id = $1 ORDER BY seq ASC"#,
        )
        .bind(center_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("shelf_occupancy", e))?;

        rows.iter()
            .map(|r| from_json_row::<ShelfRecord>("shelf", r))
            .map(|res| res.map(|shelf| ShelfOccupancySummary::from(&shelf)))
            .collect()
    }
}
