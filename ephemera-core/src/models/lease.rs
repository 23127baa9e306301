use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Persisted cleanup lease. At most one live row exists per `lock_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub lock_id: String,
    pub holder_id: String,
    pub acquired_at: DateTime<Utc>,
}

impl Lease {
    /// Stale purely by age, whether or not the holder is still running
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>, staleness: Duration) -> bool {
        self.acquired_at < now - staleness
    }
}
