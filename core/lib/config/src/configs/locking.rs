use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    Postgresql,
    File,
    /// Reserved for an external in-memory store; acquisition fails with
    /// "not implemented".
    Redis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockingConfig {
    #[serde(rename = "type")]
    pub backend: LockBackend,
    pub ttl_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    /// Directory for the `file` backend.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,
}

fn default_lock_dir() -> PathBuf {
    PathBuf::from("./locks")
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Postgresql,
            ttl_seconds: 3600,
            heartbeat_interval_seconds: 30,
            lock_dir: default_lock_dir(),
        }
    }
}
