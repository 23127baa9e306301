use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{RoomId, StoryId};

/// A story and the external media object backing it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub room_id: RoomId,
    pub media_key: String,
    /// Set once, after the media object was deleted from storage
    pub media_deleted_at: Option<DateTime<Utc>>,
    /// Last time deleting the media object failed
    pub media_delete_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Story whose room has expired but whose media object still exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiredMedia {
    pub story_id: StoryId,
    pub room_id: RoomId,
    pub media_key: String,
}
