mod migrations;
mod server;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use ephemera_cluster::{
    EventPublisher, NotificationChannel, PgNotificationChannel, RoomEventHub, RoomEventRelay,
};
use ephemera_core::{
    bootstrap::{init_database, load_config},
    logging,
    repository::{PgExpiryStore, PgLeaseStore},
    service::{DistributedLock, ExpiryCleanupService, OpendalMediaStore},
    Config,
};
use sqlx::PgPool;

use server::EphemeraServer;

/// Generate the identifier of this process
///
/// Tags relayed events so the origin can drop its own echo, and names the
/// holder of the cleanup lease.
fn generate_instance_id() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let suffix = nanoid::nanoid!(8);

    format!("{hostname}-{suffix}")
}

fn build_publisher(config: &Config, pool: &PgPool, instance_id: &str) -> Arc<EventPublisher> {
    let hub = Arc::new(RoomEventHub::new());

    let relay = if config.relay.enabled {
        let channel: Arc<dyn NotificationChannel> =
            Arc::new(PgNotificationChannel::new(pool.clone(), config.relay.channel.clone()));
        info!(
            channel = %config.relay.channel,
            reconnect_delay_secs = config.relay.reconnect_delay_seconds,
            "Cross-instance relay enabled"
        );
        Some(Arc::new(RoomEventRelay::new(channel, hub.clone(), instance_id, &config.relay)))
    } else {
        info!("Cross-instance relay disabled");
        None
    };

    Arc::new(EventPublisher::new(instance_id, hub, relay))
}

fn start_cleanup(
    config: &Config,
    pool: &PgPool,
    instance_id: &str,
    cancel_token: CancellationToken,
) -> Result<Option<JoinHandle<()>>> {
    if !config.cleanup.enabled {
        info!("Expiry cleanup disabled");
        return Ok(None);
    }

    let media = OpendalMediaStore::new(&config.storage).context("Failed to initialize media storage")?;
    let lock = DistributedLock::new(Arc::new(PgLeaseStore::new(pool.clone())));

    let service = ExpiryCleanupService::new(
        lock,
        Arc::new(PgExpiryStore::new(pool.clone())),
        Arc::new(media),
        config.cleanup.clone(),
        instance_id.to_string(),
    );

    Ok(Some(service.start(cancel_token)))
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load and validate configuration
    let config = load_config()?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    let instance_id = generate_instance_id();
    info!(instance_id = %instance_id, "Ephemera starting...");

    // 3. Initialize database
    let pool = init_database(&config).await?;

    // 4. Run migrations
    migrations::run_migrations(&pool).await?;

    // 5. Room event publisher (with relay unless disabled)
    let publisher = build_publisher(&config, &pool, &instance_id);

    // 6. Expiry cleanup timer
    let cancel_token = CancellationToken::new();
    let cleanup_handle = start_cleanup(&config, &pool, &instance_id, cancel_token.clone())?;

    // 7. Run until shutdown
    EphemeraServer::new(instance_id, pool, publisher, cleanup_handle, cancel_token)
        .run()
        .await
}
