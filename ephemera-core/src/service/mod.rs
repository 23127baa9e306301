pub mod distributed_lock;
pub mod expiry_cleanup;
pub mod media_store;

pub use distributed_lock::DistributedLock;
pub use expiry_cleanup::{CleanupReport, ExpiryCleanupService, TickOutcome};
pub use media_store::{MediaStore, OpendalMediaStore};
