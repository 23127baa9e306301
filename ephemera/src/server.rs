//! Ephemera server lifecycle
//!
//! Owns the long-running background components:
//! - room event publisher and its cross-instance relay
//! - expired room cleanup timer

use std::sync::Arc;
use std::time::Duration;

use ephemera_cluster::EventPublisher;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How long an in-flight cleanup tick may take to finish on shutdown
const CLEANUP_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EphemeraServer {
    instance_id: String,
    pool: PgPool,
    publisher: Arc<EventPublisher>,
    cleanup_handle: Option<JoinHandle<()>>,
    cancel_token: CancellationToken,
}

impl EphemeraServer {
    pub fn new(
        instance_id: String,
        pool: PgPool,
        publisher: Arc<EventPublisher>,
        cleanup_handle: Option<JoinHandle<()>>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            instance_id,
            pool,
            publisher,
            cleanup_handle,
            cancel_token,
        }
    }

    /// Run until a shutdown signal arrives, then stop every component
    pub async fn run(mut self) -> anyhow::Result<()> {
        info!(
            instance_id = %self.instance_id,
            single_node = self.publisher.is_single_node(),
            cleanup = self.cleanup_handle.is_some(),
            "Ephemera running"
        );

        shutdown_signal().await;
        info!("Shutdown signal received, starting graceful shutdown...");

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        info!("Shutting down Ephemera...");

        // 1. Stop the cleanup timer; a running tick releases its lease before exiting
        self.cancel_token.cancel();
        if let Some(handle) = self.cleanup_handle.take() {
            match tokio::time::timeout(CLEANUP_DRAIN_TIMEOUT, handle).await {
                Ok(Ok(())) => info!("Expiry cleanup stopped"),
                Ok(Err(e)) => error!("Expiry cleanup task failed: {}", e),
                Err(_) => warn!(
                    "Expiry cleanup did not stop within {}s, its lease will go stale",
                    CLEANUP_DRAIN_TIMEOUT.as_secs()
                ),
            }
        }

        // 2. Stop relaying; local subscribers are dropped with the publisher
        self.publisher.shutdown();
        if let Some(stats) = self.publisher.relay_stats() {
            info!(
                published = stats.published,
                publish_failures = stats.publish_failures,
                received = stats.received,
                forwarded = stats.forwarded,
                reconnects = stats.reconnects,
                "Room event relay stopped"
            );
        }

        // 3. Close the database connection pool
        info!("Closing database connection pool...");
        self.pool.close().await;
        info!("Database pool closed");

        info!("Ephemera shut down complete");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
