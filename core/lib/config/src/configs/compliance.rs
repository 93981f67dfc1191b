use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Compliance bounds on retention, validated before any table is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceConfig {
    pub min_retention_days: u32,
    pub max_retention_days: u32,
    /// Treat schema drift as a verification failure instead of a warning.
    #[serde(default)]
    pub fail_on_schema_drift: bool,
}

impl ComplianceConfig {
    pub fn validate_retention(&self, table: &str, retention_days: u32) -> Result<(), ConfigError> {
        if retention_days < self.min_retention_days || retention_days > self.max_retention_days {
            return Err(ConfigError::RetentionOutOfBounds {
                table: table.to_string(),
                retention_days,
                min_days: self.min_retention_days,
                max_days: self.max_retention_days,
            });
        }
        Ok(())
    }
}
