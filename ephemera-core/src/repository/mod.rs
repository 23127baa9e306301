pub mod expiry;
pub mod lease;

pub use expiry::{ExpiryStore, PgExpiryStore};
pub use lease::{LeaseStore, PgLeaseStore};
