//! Test helpers for ephemera-cluster tests
//!
//! An in-memory notification bus shared by simulated instances, with
//! per-instance disconnect injection.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::sync::{NotificationChannel, NotificationStream};
use crate::{Error, Result};

/// Shared channel every simulated instance connects to
#[derive(Default)]
pub struct MemoryBus {
    listeners: Mutex<Vec<(u64, mpsc::UnboundedSender<String>)>>,
    next_owner: AtomicU64,
}

impl MemoryBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connection of one instance to the bus
    pub fn channel(self: &Arc<Self>) -> MemoryNotificationChannel {
        MemoryNotificationChannel {
            bus: Arc::clone(self),
            owner: self.next_owner.fetch_add(1, Ordering::Relaxed),
            unavailable: AtomicBool::new(false),
            listen_attempts: AtomicUsize::new(0),
        }
    }
}

pub struct MemoryNotificationChannel {
    bus: Arc<MemoryBus>,
    owner: u64,
    unavailable: AtomicBool,
    listen_attempts: AtomicUsize,
}

impl MemoryNotificationChannel {
    /// Make `notify` and `listen` fail until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop every listener connection opened through this channel
    pub fn disconnect(&self) {
        self.bus.listeners.lock().retain(|(owner, _)| *owner != self.owner);
    }

    pub fn listen_attempts(&self) -> usize {
        self.listen_attempts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(Error::Disconnected("bus unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl NotificationChannel for MemoryNotificationChannel {
    async fn notify(&self, payload: &str) -> Result<()> {
        self.check_available()?;
        self.bus
            .listeners
            .lock()
            .retain(|(_, tx)| tx.send(payload.to_string()).is_ok());
        Ok(())
    }

    async fn listen(&self) -> Result<Box<dyn NotificationStream>> {
        self.listen_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.bus.listeners.lock().push((self.owner, tx));
        Ok(Box::new(MemoryNotificationStream { rx }))
    }
}

struct MemoryNotificationStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl NotificationStream for MemoryNotificationStream {
    async fn next_payload(&mut self) -> Result<String> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::Disconnected("listener dropped by bus".to_string()))
    }
}

/// Poll `condition` until it holds, failing the test after a while
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
