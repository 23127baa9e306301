//! Per-process registry of viewer connections, grouped by room
//!
//! Delivery is fire-and-forget. A connection whose receiver is gone is
//! removed during the broadcast that finds it closed.

use dashmap::DashMap;
use ephemera_core::models::RoomId;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::events::RoomEvent;

/// Handle for a client connection subscription
pub type ConnectionId = String;

/// Outbound stream of a viewer connection
pub type EventSender = mpsc::UnboundedSender<RoomEvent>;

#[derive(Debug, Clone)]
struct Subscriber {
    connection_id: ConnectionId,
    sender: EventSender,
}

/// In-memory hub for routing events to connected clients in rooms
/// This handles local delivery only (single process)
#[derive(Clone, Default)]
pub struct RoomEventHub {
    /// Map of room_id -> list of subscribers
    rooms: Arc<DashMap<RoomId, Vec<Subscriber>>>,

    /// Map of connection_id -> room_id for cleanup
    connections: Arc<DashMap<ConnectionId, RoomId>>,
}

impl RoomEventHub {
    /// Create a new RoomEventHub
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sender` for events of `room_id`
    ///
    /// The returned guard removes the registration when dropped.
    pub fn subscribe(&self, room_id: RoomId, sender: EventSender) -> Subscription {
        let connection_id: ConnectionId = nanoid::nanoid!(16);

        self.rooms.entry(room_id.clone()).or_default().push(Subscriber {
            connection_id: connection_id.clone(),
            sender,
        });
        self.connections.insert(connection_id.clone(), room_id.clone());

        info!(
            room_id = %room_id,
            connection_id = %connection_id,
            "Client subscribed to room"
        );

        Subscription {
            hub: self.clone(),
            connection_id,
            room_id,
        }
    }

    /// Unsubscribe a client from room events
    ///
    /// Returns `false` if the connection was not registered (already removed
    /// after a failed write, or never subscribed).
    pub fn unsubscribe(&self, connection_id: &str) -> bool {
        let Some((_, room_id)) = self.connections.remove(connection_id) else {
            debug!(connection_id = %connection_id, "Connection already unsubscribed");
            return false;
        };

        if let Some(mut subscribers) = self.rooms.get_mut(&room_id) {
            subscribers.retain(|sub| sub.connection_id != connection_id);
        }

        // Only prune when still empty; a concurrent subscribe may have refilled it
        if self
            .rooms
            .remove_if(&room_id, |_, subscribers| subscribers.is_empty())
            .is_some()
        {
            debug!(room_id = %room_id, "Room has no more subscribers, removed");
        }

        info!(
            room_id = %room_id,
            connection_id = %connection_id,
            "Client unsubscribed from room"
        );
        true
    }

    /// Broadcast an event to all subscribers in a room
    ///
    /// A handle whose receiver is gone is removed. Returns the number of
    /// successful deliveries.
    pub fn broadcast(&self, room_id: &RoomId, event: &RoomEvent) -> usize {
        let mut sent_count = 0;
        let mut failed_connections = Vec::new();

        if let Some(subscribers) = self.rooms.get(room_id) {
            for subscriber in subscribers.iter() {
                match subscriber.sender.send(event.clone()) {
                    Ok(()) => {
                        sent_count += 1;
                    }
                    Err(_) => {
                        warn!(
                            room_id = %room_id,
                            connection_id = %subscriber.connection_id,
                            "Failed to send event to client, removing subscriber"
                        );
                        failed_connections.push(subscriber.connection_id.clone());
                    }
                }
            }
        }

        for conn_id in failed_connections {
            self.unsubscribe(&conn_id);
        }

        if sent_count > 0 {
            debug!(
                room_id = %room_id,
                sent_count = sent_count,
                event_type = %event.event_type(),
                "Event broadcast complete"
            );
        }

        sent_count
    }

    /// Get the number of subscribers in a room
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }

    /// Get the number of active rooms
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Get total number of active connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Registration of one viewer connection in a [`RoomEventHub`]
///
/// Dropping the guard unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    hub: RoomEventHub,
    connection_id: ConnectionId,
    room_id: RoomId,
}

impl Subscription {
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub const fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Unsubscribe now instead of on drop
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.connection_id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("connection_id", &self.connection_id)
            .field("room_id", &self.room_id)
            .finish()
    }
}
