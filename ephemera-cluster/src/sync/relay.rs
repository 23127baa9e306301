//! Cross-instance relay of room events
//!
//! Publishes locally originated events on the shared notification channel and
//! forwards events from other instances to this process's room hub. The
//! listener reconnects after a fixed delay whenever the channel drops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ephemera_core::config::RelayConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::channel::NotificationChannel;
use super::events::{EventEnvelope, RoomEvent};
use super::room_hub::RoomEventHub;
use crate::Error;

/// Cross-instance relay for room events
///
/// This service enables multi-replica deployments by:
/// 1. Publishing local room events to the shared notification channel
/// 2. Listening on the channel for events from other instances
/// 3. Forwarding received events to the local `RoomEventHub`
///
/// Delivery is at-most-once per listener connection: events sent while a
/// listener is reconnecting are not replayed.
pub struct RoomEventRelay {
    channel: Arc<dyn NotificationChannel>,
    hub: Arc<RoomEventHub>,
    instance_id: String,
    reconnect_delay: Duration,
    publish_queue_capacity: usize,
    connected: AtomicBool,
    stats: RelayCounters,
    cancel_token: CancellationToken,
}

#[derive(Default)]
struct RelayCounters {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    self_echo_skipped: AtomicU64,
    forwarded: AtomicU64,
    reconnects: AtomicU64,
}

/// Point-in-time copy of the relay counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub published: u64,
    pub publish_failures: u64,
    pub received: u64,
    pub self_echo_skipped: u64,
    pub forwarded: u64,
    pub reconnects: u64,
}

/// Describes how one listener connection ended
enum ListenerExit {
    /// The connection was up and then dropped
    Disconnected(Error),
    /// Could not open the listener connection
    ConnectFailed(Error),
    Cancelled,
}

impl RoomEventRelay {
    pub fn new(
        channel: Arc<dyn NotificationChannel>,
        hub: Arc<RoomEventHub>,
        instance_id: impl Into<String>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            channel,
            hub,
            instance_id: instance_id.into(),
            reconnect_delay: config.reconnect_delay(),
            publish_queue_capacity: config.publish_queue_capacity.max(1),
            connected: AtomicBool::new(false),
            stats: RelayCounters::default(),
            cancel_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Whether the listener connection is currently established
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RelayStats {
        let s = &self.stats;
        RelayStats {
            published: s.published.load(Ordering::Relaxed),
            publish_failures: s.publish_failures.load(Ordering::Relaxed),
            received: s.received.load(Ordering::Relaxed),
            self_echo_skipped: s.self_echo_skipped.load(Ordering::Relaxed),
            forwarded: s.forwarded.load(Ordering::Relaxed),
            reconnects: s.reconnects.load(Ordering::Relaxed),
        }
    }

    /// Get the cancellation token for external shutdown signaling
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the publisher and listener tasks
    pub fn shutdown(&self) {
        info!("Shutting down room event relay");
        self.cancel_token.cancel();
    }

    /// Spawn the publisher and listener tasks
    ///
    /// Returns the bounded queue feeding the publisher task. Events are
    /// dropped by the sender when it is full (e.g. during a prolonged
    /// channel outage).
    pub fn start(self: Arc<Self>) -> mpsc::Sender<RoomEvent> {
        let (publish_tx, mut publish_rx) = mpsc::channel::<RoomEvent>(self.publish_queue_capacity);

        let publisher = Arc::clone(&self);
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = publisher.cancel_token.cancelled() => {
                        info!("Relay publisher task cancelled");
                        return;
                    }
                    event = publish_rx.recv() => event,
                };

                match event {
                    Some(event) => publisher.publish_event(event).await,
                    None => {
                        debug!("Relay publish queue closed, exiting");
                        return;
                    }
                }
            }
        });

        let listener = self;
        tokio::spawn(async move {
            loop {
                match listener.run_listener().await {
                    ListenerExit::Cancelled => {
                        info!("Relay listener task cancelled");
                        return;
                    }
                    ListenerExit::Disconnected(e) => {
                        error!(
                            error = %e,
                            retry_in_secs = listener.reconnect_delay.as_secs(),
                            "Relay listener connection lost, reconnecting"
                        );
                    }
                    ListenerExit::ConnectFailed(e) => {
                        error!(
                            error = %e,
                            retry_in_secs = listener.reconnect_delay.as_secs(),
                            "Relay listener failed to connect, retrying"
                        );
                    }
                }

                tokio::select! {
                    _ = listener.cancel_token.cancelled() => {
                        info!("Relay listener task cancelled during reconnect delay");
                        return;
                    }
                    _ = tokio::time::sleep(listener.reconnect_delay) => {}
                }
                listener.stats.reconnects.fetch_add(1, Ordering::Relaxed);
            }
        });

        publish_tx
    }

    async fn publish_event(&self, event: RoomEvent) {
        let event_type = event.event_type();
        let envelope = EventEnvelope {
            instance_id: self.instance_id.clone(),
            event,
        };

        let result = match serde_json::to_string(&envelope) {
            Ok(payload) => self.channel.notify(&payload).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                debug!(event_type = event_type, "Event published to notification channel");
            }
            Err(e) => {
                self.stats.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    error = %e,
                    event_type = event_type,
                    "Failed to publish event to notification channel, dropping"
                );
            }
        }
    }

    async fn run_listener(&self) -> ListenerExit {
        let mut stream = tokio::select! {
            _ = self.cancel_token.cancelled() => return ListenerExit::Cancelled,
            stream = self.channel.listen() => match stream {
                Ok(stream) => stream,
                Err(e) => return ListenerExit::ConnectFailed(e),
            },
        };

        self.connected.store(true, Ordering::Release);
        info!(instance_id = %self.instance_id, "Relay listener connected");

        let exit = loop {
            let payload = tokio::select! {
                _ = self.cancel_token.cancelled() => break ListenerExit::Cancelled,
                payload = stream.next_payload() => payload,
            };

            match payload {
                Ok(payload) => self.handle_payload(&payload),
                Err(e) => break ListenerExit::Disconnected(e),
            }
        };

        self.connected.store(false, Ordering::Release);
        exit
    }

    /// Route one payload received from the channel
    fn handle_payload(&self, payload: &str) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let envelope = match serde_json::from_str::<EventEnvelope>(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, payload = %payload, "Failed to deserialize event envelope");
                return;
            }
        };

        // Already delivered locally when it was published
        if envelope.instance_id == self.instance_id {
            self.stats.self_echo_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let Some(room_id) = envelope.event.room_id() else {
            debug!(
                origin = %envelope.instance_id,
                "Ignoring event type unknown to this build"
            );
            return;
        };

        let sent = self.hub.broadcast(room_id, &envelope.event);
        self.stats.forwarded.fetch_add(1, Ordering::Relaxed);

        debug!(
            room_id = %room_id,
            origin = %envelope.instance_id,
            event_type = envelope.event.event_type(),
            local_subscribers = sent,
            "Forwarded relayed event to local subscribers"
        );
    }
}
