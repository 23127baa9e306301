pub mod sync;
pub mod error;

#[cfg(test)]
pub mod test_helpers;

pub use error::{Error, Result};
pub use sync::{
    EventPublisher, NotificationChannel, PgNotificationChannel, PublishOutcome, RoomEvent,
    RoomEventHub, RoomEventRelay, Subscription,
};
