use serde::{Deserialize, Serialize};

use super::ArchiveDefaults;
use crate::error::ConfigError;

/// One source database and the audit tables to archive from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    /// Name of the environment variable holding the password.
    pub password_env: String,
    #[serde(default)]
    pub pool_size: Option<u32>,
    pub tables: Vec<TableConfig>,
}

fn default_port() -> u16 {
    5432
}

impl DatabaseConfig {
    pub fn password(&self) -> Result<String, ConfigError> {
        std::env::var(&self.password_env).map_err(|_| ConfigError::MissingEnvVar {
            name: self.password_env.clone(),
        })
    }

    pub fn effective_pool_size(&self, defaults: &ArchiveDefaults) -> u32 {
        self.pool_size.unwrap_or(defaults.pool_size)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.tables.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "database {} has no tables configured",
                self.name
            )));
        }
        Ok(())
    }

    // Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self {
            name: "test_db".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            user: "test_user".to_string(),
            password_env: "TEST_DB_PASSWORD".to_string(),
            pool_size: None,
            tables: vec![TableConfig::for_tests()],
        }
    }
}

/// Per-table settings; retention and batch size fall back to the run
/// defaults when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub name: String,
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub retention_days: Option<u32>,
    #[serde(default)]
    pub batch_size: Option<u32>,
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_timestamp_column() -> String {
    "created_at".to_string()
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl TableConfig {
    pub fn effective_retention_days(&self, defaults: &ArchiveDefaults) -> u32 {
        self.retention_days.unwrap_or(defaults.retention_days)
    }

    pub fn effective_batch_size(&self, defaults: &ArchiveDefaults) -> u32 {
        self.batch_size.unwrap_or(defaults.batch_size)
    }

    /// `schema.table`, for logs and error context.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    // Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self {
            schema: "public".to_string(),
            name: "audit_logs".to_string(),
            timestamp_column: "created_at".to_string(),
            primary_key: "id".to_string(),
            retention_days: Some(90),
            batch_size: Some(100),
        }
    }
}
