//! Expired room cleanup
//!
//! Every replica runs the same timer. Each tick first contends for the
//! cleanup lease; only the winner runs the two phases:
//!
//! 1. delete external media for stories in expired rooms, marking each story
//!    once its object is gone
//! 2. delete rooms that expired longer ago than the retention window
//!
//! Phase 2 does not wait for phase 1 to finish a room. A room whose media
//! deletion kept failing until retention ran out leaves its objects behind
//! in storage.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CleanupConfig;
use crate::models::ExpiredMedia;
use crate::repository::ExpiryStore;
use crate::service::{DistributedLock, MediaStore};
use crate::Result;

/// Work done by one tick that held the lease
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub media_deleted: usize,
    pub media_failed: usize,
    pub rooms_deleted: usize,
}

impl CleanupReport {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.media_deleted == 0 && self.media_failed == 0 && self.rooms_deleted == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another replica holds the lease, or it could not be checked
    Skipped,
    Completed(CleanupReport),
}

/// Lease-guarded cleanup of expired rooms
#[derive(Clone)]
pub struct ExpiryCleanupService {
    lock: DistributedLock,
    store: Arc<dyn ExpiryStore>,
    media: Arc<dyn MediaStore>,
    config: CleanupConfig,
    holder_id: String,
}

impl ExpiryCleanupService {
    /// `holder_id` identifies this process in the lease row and must stay the
    /// same for the lifetime of the process.
    #[must_use]
    pub fn new(
        lock: DistributedLock,
        store: Arc<dyn ExpiryStore>,
        media: Arc<dyn MediaStore>,
        config: CleanupConfig,
        holder_id: String,
    ) -> Self {
        Self {
            lock,
            store,
            media,
            config,
            holder_id,
        }
    }

    /// Run one cleanup cycle
    ///
    /// Returns `Skipped` when the lease is held elsewhere or the store could
    /// not be reached to take it. Once the lease is held it is released again
    /// whatever the phases return; a failed phase surfaces as `Err`.
    pub async fn run_tick(&self) -> Result<TickOutcome> {
        let lock_id = self.config.lock_id.as_str();

        let acquired = match self
            .lock
            .try_acquire(lock_id, &self.holder_id, self.config.lock_staleness())
            .await
        {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(error = %e, lock_id = %lock_id, "Could not check cleanup lease, skipping tick");
                return Ok(TickOutcome::Skipped);
            }
        };

        if !acquired {
            debug!(lock_id = %lock_id, "Cleanup lease held by another replica, skipping tick");
            return Ok(TickOutcome::Skipped);
        }

        let result = self.run_phases().await;

        if let Err(e) = self.lock.release(lock_id, &self.holder_id).await {
            error!(error = %e, lock_id = %lock_id, "Failed to release cleanup lease");
        }

        result.map(TickOutcome::Completed)
    }

    async fn run_phases(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();

        let (deleted, failed) = self.delete_expired_media().await?;
        report.media_deleted = deleted;
        report.media_failed = failed;

        report.rooms_deleted = self.purge_expired_rooms().await?;

        Ok(report)
    }

    /// Phase 1. Returns `(deleted, failed)` item counts. A failed item stays
    /// unmarked and is stamped so later ticks select it after untried items.
    async fn delete_expired_media(&self) -> Result<(usize, usize)> {
        let batch = self
            .store
            .find_expired_media(self.config.media_batch_size)
            .await?;

        let mut deleted = 0;
        let mut failed = 0;

        for item in &batch {
            match self.delete_media_item(item).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    failed += 1;
                    warn!(
                        story_id = %item.story_id,
                        room_id = %item.room_id,
                        media_key = %item.media_key,
                        error = %e,
                        "Failed to delete expired media, will retry next tick"
                    );
                    if let Err(e) = self.store.record_media_failure(&item.story_id).await {
                        warn!(story_id = %item.story_id, error = %e, "Failed to record media deletion failure");
                    }
                }
            }
        }

        if !batch.is_empty() {
            info!(deleted, failed, "Expired media deletion finished");
        }

        Ok((deleted, failed))
    }

    async fn delete_media_item(&self, item: &ExpiredMedia) -> Result<()> {
        self.media.delete_object(&item.media_key).await?;

        if !self.store.mark_media_deleted(&item.story_id).await? {
            debug!(story_id = %item.story_id, "Story already marked or gone");
        }

        Ok(())
    }

    /// Phase 2. Returns the number of rooms deleted.
    async fn purge_expired_rooms(&self) -> Result<usize> {
        let purged = self
            .store
            .purge_expired_rooms(self.config.retention_window(), self.config.room_batch_size)
            .await?;

        if !purged.is_empty() {
            info!(
                count = purged.len(),
                retention_secs = self.config.retention_window_seconds,
                "Purged rooms past retention"
            );
        }

        Ok(purged.len())
    }

    /// Start the cleanup timer
    ///
    /// Runs a tick immediately, then waits `tick_interval` after each tick has
    /// settled, so ticks of one process never overlap. Each tick runs in its
    /// own task: errors and panics are logged and never reach the timer.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                holder_id = %self.holder_id,
                interval_secs = self.config.tick_interval_seconds,
                "Expiry cleanup started"
            );

            loop {
                self.run_contained_tick().await;

                tokio::select! {
                    () = cancel.cancelled() => {
                        info!("Expiry cleanup stopped");
                        return;
                    }
                    () = tokio::time::sleep(self.config.tick_interval()) => {}
                }
            }
        })
    }

    async fn run_contained_tick(&self) {
        let service = self.clone();

        match tokio::spawn(async move { service.run_tick().await }).await {
            Ok(Ok(TickOutcome::Completed(report))) if !report.is_empty() => {
                info!(
                    media_deleted = report.media_deleted,
                    media_failed = report.media_failed,
                    rooms_deleted = report.rooms_deleted,
                    "Expiry cleanup tick completed"
                );
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Expiry cleanup tick failed");
            }
            Err(e) => {
                error!(error = %e, "Expiry cleanup tick panicked");
            }
        }
    }
}
