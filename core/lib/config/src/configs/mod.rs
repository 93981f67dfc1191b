use serde::{Deserialize, Serialize};

pub use self::{
    checkpoint::{CheckpointConfig, CheckpointStorageType},
    compliance::ComplianceConfig,
    database::{DatabaseConfig, TableConfig},
    locking::{LockBackend, LockingConfig},
    monitoring::MonitoringConfig,
    s3::{S3Config, S3Credentials},
};
use crate::error::ConfigError;

mod checkpoint;
mod compliance;
mod database;
mod locking;
mod monitoring;
mod s3;

/// Top-level archiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiverConfig {
    pub version: String,
    pub s3: S3Config,
    #[serde(default)]
    pub defaults: ArchiveDefaults,
    pub databases: Vec<DatabaseConfig>,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub compliance: Option<ComplianceConfig>,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub locking: LockingConfig,
    #[serde(default = "default_transaction_timeout_seconds")]
    pub transaction_timeout_seconds: u64,
}

fn default_transaction_timeout_seconds() -> u64 {
    1800
}

impl ArchiverConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one database must be configured".to_string(),
            ));
        }
        self.defaults.validate()?;
        self.monitoring.validate()?;
        for database in &self.databases {
            database.validate()?;
            for table in &database.tables {
                let retention = table.effective_retention_days(&self.defaults);
                if let Some(compliance) = &self.compliance {
                    compliance.validate_retention(&table.name, retention)?;
                }
            }
        }
        Ok(())
    }

    /// Narrows the config to one database and optionally one table,
    /// dropping databases left without tables. Returns whether anything
    /// remains to process.
    pub fn filter(&mut self, database: Option<&str>, table: Option<&str>) -> bool {
        self.databases.retain_mut(|db| {
            if database.is_some_and(|name| name != db.name) {
                return false;
            }
            if let Some(table) = table {
                db.tables.retain(|t| t.name == table);
            }
            !db.tables.is_empty()
        });
        !self.databases.is_empty()
    }

    // Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self {
            version: "1.0".to_string(),
            s3: S3Config::for_tests(),
            defaults: ArchiveDefaults::default(),
            databases: vec![DatabaseConfig::for_tests()],
            monitoring: MonitoringConfig::default(),
            compliance: None,
            checkpoint: CheckpointConfig::default(),
            locking: LockingConfig::default(),
            transaction_timeout_seconds: 1800,
        }
    }
}

/// Run-wide defaults; most can be overridden per table. Missing fields fall
/// back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveDefaults {
    pub retention_days: u32,
    pub batch_size: u32,
    pub safety_buffer_days: u32,
    pub sleep_between_batches_ms: u64,
    pub vacuum_after: bool,
    pub parallel_databases: bool,
    pub max_parallel_databases: usize,
    pub pool_size: u32,
}

impl Default for ArchiveDefaults {
    fn default() -> Self {
        Self {
            retention_days: 90,
            batch_size: 10_000,
            safety_buffer_days: 1,
            sleep_between_batches_ms: 0,
            vacuum_after: false,
            parallel_databases: false,
            max_parallel_databases: 2,
            pool_size: 5,
        }
    }
}

impl ArchiveDefaults {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".to_string()));
        }
        if self.max_parallel_databases == 0 {
            return Err(ConfigError::Invalid(
                "max_parallel_databases must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
