// Module: sync

pub mod channel;
pub mod events;
pub mod publisher;
pub mod relay;
pub mod room_hub;

pub use channel::{NotificationChannel, NotificationStream, PgNotificationChannel};
pub use events::{EventEnvelope, RoomEvent};
pub use publisher::{EventPublisher, PublishOutcome};
pub use relay::{RelayStats, RoomEventRelay};
pub use room_hub::{ConnectionId, EventSender, RoomEventHub, Subscription};
