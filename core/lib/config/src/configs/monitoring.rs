use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Post-archive sample verification settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Fraction of each batch to sample, in (0, 1].
    pub sample_percentage: f64,
    pub min_samples: usize,
    pub max_samples: usize,
    /// Fixed PRNG seed for deterministic sampling in tests.
    #[serde(default)]
    pub sample_seed: Option<u64>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            sample_percentage: 0.01,
            min_samples: 10,
            max_samples: 1000,
            sample_seed: None,
        }
    }
}

impl MonitoringConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.sample_percentage > 0.0 && self.sample_percentage <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "sample_percentage must be in (0, 1], got {}",
                self.sample_percentage
            )));
        }
        if self.min_samples < 1 {
            return Err(ConfigError::Invalid(format!(
                "min_samples must be at least 1, got {}",
                self.min_samples
            )));
        }
        if self.max_samples < self.min_samples {
            return Err(ConfigError::Invalid(format!(
                "max_samples ({}) must be >= min_samples ({})",
                self.max_samples, self.min_samples
            )));
        }
        Ok(())
    }
}
