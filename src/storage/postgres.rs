//! PostgreSQL implementation of [`RequestStore`].
//!
//! Requests live in the `grant_requests` table (see `migrations/`). Business fields are a JSONB
//! column; the lifecycle columns are only ever written by `update_status`, which locks the row,
//! validates the change in the domain layer and writes it back inside one transaction.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use super::RequestStore;
use crate::error::{ConsoleError, Result};
use crate::request::{GrantRequest, NewGrantRequest, RequestFields, RequestId, StatusUpdate};

mod pool_provider;

pub use pool_provider::{PoolProvider, TestDbPools};

const COLUMNS: &str = "id, status, fields, recipient, file_path, created_at, run_at, \
                       delivered_at, delivered_to";

/// PostgreSQL request store.
///
/// # Example
/// ```ignore
/// use grant_console::storage::postgres::PostgresRequestStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgresql://localhost/grants").await?;
/// grant_console::migrator().run(&pool).await?;
/// let store = PostgresRequestStore::new(pool);
/// ```
#[derive(Clone)]
pub struct PostgresRequestStore<P: PoolProvider = sqlx::PgPool> {
    pools: P,
}

impl<P: PoolProvider> PostgresRequestStore<P> {
    pub fn new(pools: P) -> Self {
        Self { pools }
    }

    /// Get the pool provider.
    pub fn pools(&self) -> &P {
        &self.pools
    }
}

#[derive(sqlx::FromRow)]
struct GrantRequestRow {
    id: Uuid,
    status: String,
    fields: Json<RequestFields>,
    recipient: Option<String>,
    file_path: Option<String>,
    created_at: DateTime<Utc>,
    run_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    delivered_to: Option<String>,
}

impl TryFrom<GrantRequestRow> for GrantRequest {
    type Error = ConsoleError;

    fn try_from(row: GrantRequestRow) -> Result<Self> {
        let status = row.status.parse().map_err(|e: String| {
            ConsoleError::Other(anyhow::anyhow!("Corrupt request row {}: {}", row.id, e))
        })?;

        Ok(GrantRequest {
            id: RequestId(row.id),
            status,
            fields: row.fields.0,
            recipient: row.recipient,
            file_path: row.file_path.map(PathBuf::from),
            created_at: row.created_at,
            run_at: row.run_at,
            delivered_at: row.delivered_at,
            delivered_to: row.delivered_to,
        })
    }
}

#[async_trait]
impl<P: PoolProvider> RequestStore for PostgresRequestStore<P> {
    #[tracing::instrument(skip(self, input))]
    async fn create(&self, input: NewGrantRequest) -> Result<GrantRequest> {
        input.validate()?;
        let request = GrantRequest::new(input, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO grant_requests (id, status, fields, recipient, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(*request.id)
        .bind(request.status.as_str())
        .bind(Json(&request.fields))
        .bind(request.recipient.as_deref())
        .bind(request.created_at)
        .execute(self.pools.write())
        .await?;

        tracing::debug!(request_id = %request.id, "Inserted grant request");
        Ok(request)
    }

    async fn list(&self) -> Result<Vec<GrantRequest>> {
        let rows: Vec<GrantRequestRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM grant_requests ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(self.pools.read())
        .await?;

        rows.into_iter().map(GrantRequest::try_from).collect()
    }

    async fn get(&self, id: RequestId) -> Result<GrantRequest> {
        let row: Option<GrantRequestRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM grant_requests WHERE id = $1"))
                .bind(*id)
                .fetch_optional(self.pools.read())
                .await?;

        row.ok_or(ConsoleError::RequestNotFound(id))?.try_into()
    }

    #[tracing::instrument(skip(self, update), fields(request_id = %id, to = %update.target()))]
    async fn update_status(&self, id: RequestId, update: StatusUpdate) -> Result<GrantRequest> {
        let mut tx = self.pools.write().begin().await?;

        let row: Option<GrantRequestRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM grant_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(*id)
        .fetch_optional(&mut *tx)
        .await?;

        let current: GrantRequest = row.ok_or(ConsoleError::RequestNotFound(id))?.try_into()?;
        // Dropping the transaction on a rejected transition rolls back the lock
        let updated = current.apply(update)?;

        sqlx::query(
            r#"
            UPDATE grant_requests SET
                status = $2,
                file_path = $3,
                run_at = $4,
                delivered_at = $5,
                delivered_to = $6
            WHERE id = $1
            "#,
        )
        .bind(*id)
        .bind(updated.status.as_str())
        .bind(
            updated
                .file_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned()),
        )
        .bind(updated.run_at)
        .bind(updated.delivered_at)
        .bind(updated.delivered_to.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    #[tracing::instrument(skip(self), fields(request_id = %id))]
    async fn delete(&self, id: RequestId) -> Result<GrantRequest> {
        let row: Option<GrantRequestRow> = sqlx::query_as(&format!(
            "DELETE FROM grant_requests WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(*id)
        .fetch_optional(self.pools.write())
        .await?;

        row.ok_or(ConsoleError::RequestNotFound(id))?.try_into()
    }

    async fn stale_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<RequestId>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM grant_requests WHERE status = 'running' AND run_at < $1",
        )
        .bind(older_than)
        .fetch_all(self.pools.write())
        .await?;

        Ok(ids.into_iter().map(RequestId).collect())
    }
}
