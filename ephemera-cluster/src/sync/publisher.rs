//! Process-wide entry point for room change events
//!
//! Constructed once at startup and shared as `Arc<EventPublisher>` with every
//! handler that mutates room content or streams events to viewers.

use std::sync::Arc;

use ephemera_core::models::RoomId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::events::RoomEvent;
use super::relay::{RelayStats, RoomEventRelay};
use super::room_hub::{EventSender, RoomEventHub, Subscription};

/// What happened to one published event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Local subscribers the event was written to
    pub local_sent: usize,
    /// Whether the event was queued for other instances
    pub relayed: bool,
}

struct RelayHandle {
    relay: Arc<RoomEventRelay>,
    queue: mpsc::Sender<RoomEvent>,
}

pub struct EventPublisher {
    instance_id: String,
    hub: Arc<RoomEventHub>,
    relay: Option<RelayHandle>,
}

impl EventPublisher {
    /// Create the publisher, starting `relay` when one is given
    ///
    /// Without a relay the process runs in single-node mode and events only
    /// reach its own subscribers. Must be called inside a Tokio runtime.
    pub fn new(
        instance_id: impl Into<String>,
        hub: Arc<RoomEventHub>,
        relay: Option<Arc<RoomEventRelay>>,
    ) -> Self {
        let instance_id = instance_id.into();

        let relay = relay.map(|relay| {
            let queue = Arc::clone(&relay).start();
            info!(instance_id = %instance_id, "Room event relay started");
            RelayHandle { relay, queue }
        });

        if relay.is_none() {
            info!(instance_id = %instance_id, "Room events delivered locally only (single-node mode)");
        }

        Self {
            instance_id,
            hub,
            relay,
        }
    }

    /// Publisher without a relay
    pub fn single_node(instance_id: impl Into<String>) -> Self {
        Self::new(instance_id, Arc::new(RoomEventHub::new()), None)
    }

    /// Deliver `event` to local subscribers, then queue it for other instances
    ///
    /// Never blocks and never fails; a full or closed relay queue is logged
    /// and the event stays local.
    pub fn publish(&self, event: RoomEvent) -> PublishOutcome {
        let Some(room_id) = event.room_id() else {
            warn!("Refusing to publish an event without a room");
            return PublishOutcome::default();
        };

        let local_sent = self.hub.broadcast(room_id, &event);

        let relayed = match &self.relay {
            Some(handle) => match handle.queue.try_send(event) {
                Ok(()) => true,
                Err(TrySendError::Full(event)) => {
                    warn!(
                        room_id = ?event.room_id(),
                        event_type = event.event_type(),
                        "Relay publish queue full, event not relayed"
                    );
                    false
                }
                Err(TrySendError::Closed(event)) => {
                    warn!(
                        room_id = ?event.room_id(),
                        event_type = event.event_type(),
                        "Relay publish queue closed, event not relayed"
                    );
                    false
                }
            },
            None => false,
        };

        debug!(local_sent = local_sent, relayed = relayed, "Room event published");

        PublishOutcome {
            local_sent,
            relayed,
        }
    }

    /// Announce that the stories of `room_id` changed
    pub fn publish_stories_changed(&self, room_id: RoomId, version: Option<i64>) -> PublishOutcome {
        self.publish(RoomEvent::stories_changed(room_id, version))
    }

    /// Register a viewer connection for `room_id`
    pub fn subscribe(&self, room_id: RoomId, sender: EventSender) -> Subscription {
        self.hub.subscribe(room_id, sender)
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn hub(&self) -> &Arc<RoomEventHub> {
        &self.hub
    }

    pub const fn is_single_node(&self) -> bool {
        self.relay.is_none()
    }

    /// Listener state of the relay, `false` in single-node mode
    pub fn is_relay_connected(&self) -> bool {
        self.relay.as_ref().is_some_and(|handle| handle.relay.is_connected())
    }

    pub fn relay_stats(&self) -> Option<RelayStats> {
        self.relay.as_ref().map(|handle| handle.relay.stats())
    }

    /// Stop the relay tasks; local delivery keeps working
    pub fn shutdown(&self) {
        if let Some(handle) = &self.relay {
            handle.relay.shutdown();
        }
    }
}
