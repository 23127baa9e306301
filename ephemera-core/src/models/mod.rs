pub mod id;
pub mod lease;
pub mod room;
pub mod story;

pub use id::{generate_id, RoomId, StoryId};
pub use lease::Lease;
pub use room::Room;
pub use story::{ExpiredMedia, Story};
