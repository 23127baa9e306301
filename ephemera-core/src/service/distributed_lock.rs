//! Distributed lock service backed by the relational store
//!
//! Elects at most one replica to run a cleanup cycle. A lease row is reclaimed
//! once it is older than the staleness timeout, so a holder that crashed
//! without releasing only blocks cleanup for that long.

use std::sync::Arc;
use std::time::Duration;

use crate::repository::LeaseStore;
use crate::Result;

/// Distributed lock service
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn LeaseStore>,
}

impl DistributedLock {
    #[must_use]
    pub fn new(store: Arc<dyn LeaseStore>) -> Self {
        Self { store }
    }

    /// Try to take the lease for `lock_id` on behalf of `holder_id`
    ///
    /// First deletes a lease older than `staleness`, then inserts a fresh row
    /// under the `lock_id` uniqueness constraint. Returns `true` iff the
    /// insert succeeded.
    ///
    /// An `Err` means the outcome is unknown; callers must treat it as not
    /// acquired.
    pub async fn try_acquire(
        &self,
        lock_id: &str,
        holder_id: &str,
        staleness: Duration,
    ) -> Result<bool> {
        let reclaimed = self.store.reclaim_stale(lock_id, staleness).await?;
        if reclaimed > 0 {
            tracing::warn!(
                lock_id = %lock_id,
                staleness_secs = staleness.as_secs(),
                "Reclaimed stale lease"
            );
        }

        let acquired = self.store.insert(lock_id, holder_id).await?;
        if acquired {
            tracing::debug!(lock_id = %lock_id, holder_id = %holder_id, "Lease acquired");
        } else {
            tracing::debug!(lock_id = %lock_id, "Lease already held by another process");
        }

        Ok(acquired)
    }

    /// Release the lease, only if `holder_id` still owns it
    ///
    /// # Returns
    /// * `true` if the lease row was deleted
    /// * `false` if the lease was reclaimed by someone else or already gone
    pub async fn release(&self, lock_id: &str, holder_id: &str) -> Result<bool> {
        let released = self.store.remove(lock_id, holder_id).await?;

        if released {
            tracing::debug!(lock_id = %lock_id, holder_id = %holder_id, "Lease released");
        } else {
            tracing::warn!(
                lock_id = %lock_id,
                holder_id = %holder_id,
                "Lease release skipped: not held by this process"
            );
        }

        Ok(released)
    }
}
