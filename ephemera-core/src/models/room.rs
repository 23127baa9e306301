use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::id::RoomId;

/// Time-boxed room. Owned by the room subsystem; cleanup only reads it and
/// deletes it once it is past retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Room {
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Expired for longer than `retention`, so its rows may be deleted
    #[must_use]
    pub fn is_past_retention_at(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.expires_at < now - retention
    }
}
