//! Shared notification channel used by the cross-instance relay
//!
//! PostgreSQL LISTEN/NOTIFY in production; every replica publishes to and
//! listens on the same channel name.

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool};
use tracing::{debug, info};

use crate::{Error, Result};

/// Publish side and listener factory of a broadcast channel
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Send one payload to every current listener, including our own
    async fn notify(&self, payload: &str) -> Result<()>;

    /// Open a dedicated listening connection
    async fn listen(&self) -> Result<Box<dyn NotificationStream>>;
}

/// Receiving end of one listening connection
#[async_trait]
pub trait NotificationStream: Send {
    /// Wait for the next payload
    ///
    /// Returns an error once the underlying connection is lost; the stream is
    /// unusable afterwards and a new one has to be opened with
    /// [`NotificationChannel::listen`].
    async fn next_payload(&mut self) -> Result<String>;
}

/// LISTEN/NOTIFY on a PostgreSQL channel
#[derive(Clone)]
pub struct PgNotificationChannel {
    pool: PgPool,
    channel: String,
}

impl PgNotificationChannel {
    /// `channel` must be a plain SQL identifier
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl NotificationChannel for PgNotificationChannel {
    async fn notify(&self, payload: &str) -> Result<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(payload)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn listen(&self) -> Result<Box<dyn NotificationStream>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;

        info!(channel = %self.channel, "Listening for notifications");

        Ok(Box::new(PgNotificationStream {
            listener,
            channel: self.channel.clone(),
        }))
    }
}

struct PgNotificationStream {
    listener: PgListener,
    channel: String,
}

#[async_trait]
impl NotificationStream for PgNotificationStream {
    async fn next_payload(&mut self) -> Result<String> {
        // None means the connection was lost; recv() would reconnect silently
        match self.listener.try_recv().await? {
            Some(notification) => {
                debug!(
                    channel = %self.channel,
                    process_id = notification.process_id(),
                    "Notification received"
                );
                Ok(notification.payload().to_string())
            }
            None => Err(Error::Disconnected(format!(
                "listener connection for channel {} was closed",
                self.channel
            ))),
        }
    }
}
