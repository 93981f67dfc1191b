//! Typed configuration for the audit table archiver.
//!
//! Configuration is a single YAML document with `${VAR}` environment
//! substitution. Every option is enumerated and defaulted here; unknown keys
//! warn instead of failing so older binaries tolerate newer config files.

pub use crate::{
    configs::{
        ArchiveDefaults, ArchiverConfig, CheckpointConfig, CheckpointStorageType,
        ComplianceConfig, DatabaseConfig, LockBackend, LockingConfig, MonitoringConfig,
        S3Config, S3Credentials, TableConfig,
    },
    error::ConfigError,
    load::load_config_from_str,
};

pub mod configs;
mod error;
mod load;

use std::path::Path;

/// Reads and parses the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<ArchiverConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.display().to_string(),
        source: err,
    })?;
    load_config_from_str(&raw)
}
