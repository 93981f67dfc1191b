use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Object store target. `endpoint` supports S3-compatible stores (MinIO,
/// Ceph RGW); when unset the standard AWS endpoint resolution applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Key prefix joined ahead of every object key.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
    /// Server-side encryption algorithm, e.g. `AES256`.
    #[serde(default)]
    pub encryption: Option<String>,
    #[serde(default)]
    pub credentials: Option<S3Credentials>,
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u16,
}

fn default_requests_per_second() -> f64 {
    10.0
}

fn default_max_retries() -> u16 {
    3
}

/// Credentials are referenced by environment variable name, never stored in
/// the config file itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Credentials {
    pub access_key_env: String,
    pub secret_key_env: String,
}

impl S3Credentials {
    pub fn resolve(&self) -> Result<(String, String), ConfigError> {
        let access_key =
            std::env::var(&self.access_key_env).map_err(|_| ConfigError::MissingEnvVar {
                name: self.access_key_env.clone(),
            })?;
        let secret_key =
            std::env::var(&self.secret_key_env).map_err(|_| ConfigError::MissingEnvVar {
                name: self.secret_key_env.clone(),
            })?;
        Ok((access_key, secret_key))
    }
}

impl S3Config {
    // Creates a config object suitable for use in unit tests.
    pub fn for_tests() -> Self {
        Self {
            bucket: "test-bucket".to_string(),
            region: Some("us-east-1".to_string()),
            prefix: "archives".to_string(),
            endpoint: None,
            storage_class: None,
            encryption: None,
            credentials: None,
            requests_per_second: 10.0,
            max_retries: 3,
        }
    }
}
