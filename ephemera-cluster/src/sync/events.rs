use ephemera_core::models::RoomId;
use serde::{Deserialize, Serialize};

/// Room change hints fanned out to every viewer of a room, on every replica
///
/// Events carry no authoritative payload; receivers re-fetch room state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomEvent {
    /// Stories in a room were created, deleted or otherwise changed
    StoriesChanged {
        room_id: RoomId,
        /// Monotonic hint letting a client skip a refresh it already applied
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<i64>,
    },

    /// Tag emitted by a newer peer that this build does not understand
    #[serde(other)]
    Unknown,
}

impl RoomEvent {
    #[must_use]
    pub const fn stories_changed(room_id: RoomId, version: Option<i64>) -> Self {
        Self::StoriesChanged { room_id, version }
    }

    /// Get the room this event belongs to
    #[must_use]
    pub const fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::StoriesChanged { room_id, .. } => Some(room_id),
            Self::Unknown => None,
        }
    }

    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::StoriesChanged { .. } => "stories_changed",
            Self::Unknown => "unknown",
        }
    }
}

/// Wire format on the shared notification channel
///
/// `instance_id` names the origin process so it can drop its own echo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub instance_id: String,
    pub event: RoomEvent,
}
