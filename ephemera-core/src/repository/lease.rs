use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::{models::Lease, Result};

/// Storage for named cleanup leases.
///
/// Every method is a single atomic statement against the shared store. The
/// uniqueness of `lock_id` enforced by `insert` is the only source of mutual
/// exclusion between replicas.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Delete the lease row for `lock_id` if it is older than `staleness`.
    /// Returns the number of rows removed.
    async fn reclaim_stale(&self, lock_id: &str, staleness: Duration) -> Result<u64>;

    /// Insert a fresh lease row. Returns `false` when a row already exists.
    async fn insert(&self, lock_id: &str, holder_id: &str) -> Result<bool>;

    /// Delete the lease row only if it is held by `holder_id`.
    async fn remove(&self, lock_id: &str, holder_id: &str) -> Result<bool>;

    /// Current lease row for `lock_id`, stale or not
    async fn current(&self, lock_id: &str) -> Result<Option<Lease>>;
}

/// Lease repository backed by the `cleanup_locks` table
#[derive(Clone)]
pub struct PgLeaseStore {
    pool: PgPool,
}

impl PgLeaseStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseStore for PgLeaseStore {
    async fn reclaim_stale(&self, lock_id: &str, staleness: Duration) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM cleanup_locks
             WHERE lock_id = $1 AND acquired_at < NOW() - make_interval(secs => $2)",
        )
        .bind(lock_id)
        .bind(staleness.as_secs_f64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert(&self, lock_id: &str, holder_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO cleanup_locks (lock_id, holder_id, acquired_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (lock_id) DO NOTHING",
        )
        .bind(lock_id)
        .bind(holder_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn remove(&self, lock_id: &str, holder_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM cleanup_locks WHERE lock_id = $1 AND holder_id = $2")
            .bind(lock_id)
            .bind(holder_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn current(&self, lock_id: &str) -> Result<Option<Lease>> {
        let row = sqlx::query(
            "SELECT lock_id, holder_id, acquired_at FROM cleanup_locks WHERE lock_id = $1",
        )
        .bind(lock_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Lease> {
            Ok(Lease {
                lock_id: row.try_get("lock_id")?,
                holder_id: row.try_get("holder_id")?,
                acquired_at: row.try_get("acquired_at")?,
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::migrated_pool;

    fn lock_id() -> String {
        format!("test_lock_{}", nanoid::nanoid!(8))
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_insert_conflict_returns_false() {
        let store = PgLeaseStore::new(migrated_pool().await);
        let lock_id = lock_id();

        assert!(store.insert(&lock_id, "node-a").await.unwrap());
        assert!(!store.insert(&lock_id, "node-b").await.unwrap());

        let lease = store.current(&lock_id).await.unwrap().unwrap();
        assert_eq!(lease.holder_id, "node-a");

        store.remove(&lock_id, "node-a").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_remove_only_by_holder() {
        let store = PgLeaseStore::new(migrated_pool().await);
        let lock_id = lock_id();
        store.insert(&lock_id, "node-a").await.unwrap();

        assert!(!store.remove(&lock_id, "node-b").await.unwrap());
        assert!(store.current(&lock_id).await.unwrap().is_some());

        assert!(store.remove(&lock_id, "node-a").await.unwrap());
        assert!(store.current(&lock_id).await.unwrap().is_none());
        assert!(!store.remove(&lock_id, "node-a").await.unwrap());
    }

    #[tokio::test]
    #[ignore = "Requires PostgreSQL"]
    async fn test_reclaim_stale_uses_row_age() {
        let pool = migrated_pool().await;
        let store = PgLeaseStore::new(pool.clone());
        let staleness = Duration::from_secs(300);

        let fresh = lock_id();
        store.insert(&fresh, "node-a").await.unwrap();
        assert_eq!(store.reclaim_stale(&fresh, staleness).await.unwrap(), 0);
        assert!(store.current(&fresh).await.unwrap().is_some());

        let aged = lock_id();
        sqlx::query(
            "INSERT INTO cleanup_locks (lock_id, holder_id, acquired_at)
             VALUES ($1, 'crashed-node', NOW() - interval '10 minutes')",
        )
        .bind(&aged)
        .execute(&pool)
        .await
        .unwrap();
        assert_eq!(store.reclaim_stale(&aged, staleness).await.unwrap(), 1);
        assert!(store.current(&aged).await.unwrap().is_none());

        // A fresh contender can take the reclaimed lease
        assert!(store.insert(&aged, "node-b").await.unwrap());

        store.remove(&fresh, "node-a").await.unwrap();
        store.remove(&aged, "node-b").await.unwrap();
    }
}
