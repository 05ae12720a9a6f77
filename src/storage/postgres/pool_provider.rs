//! Pool provider abstraction for read/write routing.
//!
//! [`PoolProvider`] lets [`PostgresRequestStore`](super::PostgresRequestStore) send the admin
//! list and single-row reads to a replica while every status update and delete goes to the
//! primary. A bare [`PgPool`] serves both roles.

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Trait for providing database pools with read/write routing.
pub trait PoolProvider: Clone + Send + Sync + 'static {
    /// Pool for reads that can tolerate slight staleness (listing, loading one row).
    fn read(&self) -> &PgPool;

    /// Pool for inserts, updates, deletes, and locking reads (`SELECT ... FOR UPDATE`).
    fn write(&self) -> &PgPool;
}

impl PoolProvider for PgPool {
    fn read(&self) -> &PgPool {
        self
    }

    fn write(&self) -> &PgPool {
        self
    }
}

/// Test pool provider with read-only replica enforcement.
///
/// Two pools over the same database: the primary for writes and a "replica" whose connections
/// run with `default_transaction_read_only = on`. A write routed through `.read()` fails with
/// "cannot execute ... in a read-only transaction", so tests catch misrouted queries.
///
/// # Example
///
/// ```ignore
/// #[sqlx::test]
/// async fn test_something(pool: PgPool) {
///     let pools = TestDbPools::new(pool).await.unwrap();
///     let store = PostgresRequestStore::new(pools);
/// }
/// ```
#[derive(Clone, Debug)]
pub struct TestDbPools {
    primary: PgPool,
    replica: PgPool,
}

impl TestDbPools {
    /// Create test pools from a single database pool.
    pub async fn new(pool: PgPool) -> Result<Self, sqlx::Error> {
        let primary = pool.clone();

        let replica = PgPoolOptions::new()
            .max_connections(pool.options().get_max_connections())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("SET default_transaction_read_only = on")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect_with(pool.connect_options().as_ref().clone())
            .await?;

        Ok(Self { primary, replica })
    }
}

impl PoolProvider for TestDbPools {
    fn read(&self) -> &PgPool {
        &self.replica
    }

    fn write(&self) -> &PgPool {
        &self.primary
    }
}
