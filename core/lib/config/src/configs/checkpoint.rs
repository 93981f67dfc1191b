use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStorageType {
    S3,
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub enabled: bool,
    pub storage_type: CheckpointStorageType,
    /// Batches between checkpoint writes.
    pub frequency: u64,
    /// Directory for the `local` backend.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
}

fn default_local_path() -> PathBuf {
    PathBuf::from("./checkpoints")
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage_type: CheckpointStorageType::S3,
            frequency: 10,
            local_path: default_local_path(),
        }
    }
}
