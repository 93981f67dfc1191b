use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A held (or on-disk) distributed lock. `owner` is a stable per-process
/// identity so a crashed holder can be distinguished from the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub lock_key: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub owner: String,
}

impl LockRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Seconds until expiry; negative when already expired.
    pub fn time_until_expiry(&self) -> f64 {
        (self.expires_at - Utc::now()).num_milliseconds() as f64 / 1000.0
    }
}
