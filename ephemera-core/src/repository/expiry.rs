use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::time::Duration;

use crate::{
    models::{ExpiredMedia, RoomId, StoryId},
    Result,
};

/// Queries the expiry cleanup runs against rooms and stories.
///
/// Selections are bounded by `limit` and every mutation is one statement, so
/// a tick interrupted at any point leaves state another replica can resume.
#[async_trait]
pub trait ExpiryStore: Send + Sync {
    /// Stories in expired rooms whose media object has not been deleted yet.
    ///
    /// Never-attempted stories come first, then those whose last failed
    /// attempt is oldest, each group ordered by room expiry.
    async fn find_expired_media(&self, limit: u32) -> Result<Vec<ExpiredMedia>>;

    /// Record that the media object for `story_id` is gone. Returns `false`
    /// when the story was already marked or no longer exists.
    async fn mark_media_deleted(&self, story_id: &StoryId) -> Result<bool>;

    /// Stamp a failed media deletion on a still-unmarked story, moving it
    /// behind the stories not yet attempted. Returns `false` when the story
    /// was already marked or no longer exists.
    async fn record_media_failure(&self, story_id: &StoryId) -> Result<bool>;

    /// Delete up to `limit` rooms that expired more than `retention` ago.
    /// Dependent rows go with them through cascading foreign keys.
    async fn purge_expired_rooms(&self, retention: Duration, limit: u32) -> Result<Vec<RoomId>>;
}

/// Expiry repository for PostgreSQL
#[derive(Clone)]
pub struct PgExpiryStore {
    pool: PgPool,
}

impl PgExpiryStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_expired_media(row: &PgRow) -> Result<ExpiredMedia> {
        Ok(ExpiredMedia {
            story_id: row.try_get("id")?,
            room_id: row.try_get("room_id")?,
            media_key: row.try_get("media_key")?,
        })
    }
}

#[async_trait]
impl ExpiryStore for PgExpiryStore {
    async fn find_expired_media(&self, limit: u32) -> Result<Vec<ExpiredMedia>> {
        let rows = sqlx::query(
            "SELECT s.id, s.room_id, s.media_key
             FROM stories s
             JOIN rooms r ON r.id = s.room_id
             WHERE r.expires_at < NOW() AND s.media_deleted_at IS NULL
             ORDER BY s.media_delete_attempted_at ASC NULLS FIRST, r.expires_at ASC
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_expired_media).collect()
    }

    async fn mark_media_deleted(&self, story_id: &StoryId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE stories SET media_deleted_at = NOW()
             WHERE id = $1 AND media_deleted_at IS NULL",
        )
        .bind(story_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_media_failure(&self, story_id: &StoryId) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE stories SET media_delete_attempted_at = NOW()
             WHERE id = $1 AND media_deleted_at IS NULL",
        )
        .bind(story_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired_rooms(&self, retention: Duration, limit: u32) -> Result<Vec<RoomId>> {
        let rows = sqlx::query(
            "DELETE FROM rooms
             WHERE id IN (
                 SELECT id FROM rooms
                 WHERE expires_at < NOW() - make_interval(secs => $1)
                 ORDER BY expires_at ASC
                 LIMIT $2
             )
             RETURNING id",
        )
        .bind(retention.as_secs_f64())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<RoomId, _>("id").map_err(Into::into))
            .collect()
    }
}
