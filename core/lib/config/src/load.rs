use regex::Regex;
use serde_yaml::Value;

use crate::{configs::ArchiverConfig, error::ConfigError};

const TOP_LEVEL_KEYS: &[&str] = &[
    "version",
    "s3",
    "defaults",
    "databases",
    "monitoring",
    "compliance",
    "checkpoint",
    "locking",
    "transaction_timeout_seconds",
];

const S3_KEYS: &[&str] = &[
    "bucket",
    "region",
    "prefix",
    "endpoint",
    "storage_class",
    "encryption",
    "credentials",
    "requests_per_second",
    "max_retries",
];

const DATABASE_KEYS: &[&str] = &["name", "host", "port", "user", "password_env", "pool_size", "tables"];

const TABLE_KEYS: &[&str] = &[
    "schema",
    "name",
    "timestamp_column",
    "primary_key",
    "retention_days",
    "batch_size",
];

/// Parses a YAML config document after `${VAR}` substitution.
///
/// Unknown keys are logged and ignored so configs written for newer versions
/// keep loading; a referenced-but-unset environment variable is an error.
pub fn load_config_from_str(raw: &str) -> Result<ArchiverConfig, ConfigError> {
    let substituted = substitute_env_vars(raw)?;
    let value: Value = serde_yaml::from_str(&substituted)?;
    warn_unknown_keys(&value, TOP_LEVEL_KEYS, "");
    if let Some(s3) = value.get("s3") {
        warn_unknown_keys(s3, S3_KEYS, "s3");
    }
    if let Some(Value::Sequence(databases)) = value.get("databases") {
        for (i, database) in databases.iter().enumerate() {
            warn_unknown_keys(database, DATABASE_KEYS, &format!("databases[{i}]"));
            if let Some(Value::Sequence(tables)) = database.get("tables") {
                for (j, table) in tables.iter().enumerate() {
                    warn_unknown_keys(table, TABLE_KEYS, &format!("databases[{i}].tables[{j}]"));
                }
            }
        }
    }

    let config: ArchiverConfig = serde_yaml::from_value(value)?;
    config.validate()?;
    Ok(config)
}

fn substitute_env_vars(raw: &str) -> Result<String, ConfigError> {
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("static regex");
    let mut missing: Option<String> = None;
    let substituted = pattern.replace_all(raw, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(ConfigError::MissingEnvVar { name }),
        None => Ok(substituted.into_owned()),
    }
}

fn warn_unknown_keys(value: &Value, known: &[&str], path: &str) {
    let Value::Mapping(map) = value else {
        return;
    };
    for key in map.keys() {
        if let Value::String(key) = key {
            if !known.contains(&key.as_str()) {
                tracing::warn!(
                    key = %key,
                    section = %if path.is_empty() { "<root>" } else { path },
                    "Unknown configuration key, ignoring"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::configs::{CheckpointStorageType, LockBackend};

    const SAMPLE: &str = r#"
version: "1.0"
s3:
  bucket: audit-archive
  region: us-east-1
  prefix: archives
defaults:
  retention_days: 90
  batch_size: 1000
  safety_buffer_days: 1
  sleep_between_batches_ms: 0
  vacuum_after: false
  parallel_databases: false
  max_parallel_databases: 2
  pool_size: 5
databases:
  - name: app
    host: localhost
    user: archiver
    password_env: APP_DB_PASSWORD
    tables:
      - name: audit_logs
        timestamp_column: created_at
        primary_key: id
monitoring:
  sample_percentage: 0.01
  min_samples: 10
  max_samples: 1000
checkpoint:
  enabled: true
  storage_type: local
  frequency: 5
locking:
  type: file
  ttl_seconds: 3600
  heartbeat_interval_seconds: 30
"#;

    #[test]
    fn parses_full_document() {
        let config = load_config_from_str(SAMPLE).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.s3.bucket, "audit-archive");
        assert_eq!(config.databases.len(), 1);
        assert_eq!(config.databases[0].port, 5432);
        assert_eq!(config.databases[0].tables[0].schema, "public");
        assert_eq!(
            config.checkpoint.storage_type,
            CheckpointStorageType::Local
        );
        assert_eq!(config.locking.backend, LockBackend::File);
        assert_eq!(config.transaction_timeout_seconds, 1800);
    }

    #[test]
    fn substitutes_environment_variables() {
        std::env::set_var("ARCHIVER_TEST_BUCKET", "from-env");
        let raw = SAMPLE.replace("audit-archive", "${ARCHIVER_TEST_BUCKET}");
        let config = load_config_from_str(&raw).unwrap();
        assert_eq!(config.s3.bucket, "from-env");
    }

    #[test]
    fn missing_env_var_is_an_error() {
        let raw = SAMPLE.replace("audit-archive", "${ARCHIVER_TEST_UNSET_VAR}");
        assert_matches!(
            load_config_from_str(&raw),
            Err(ConfigError::MissingEnvVar { name }) if name == "ARCHIVER_TEST_UNSET_VAR"
        );
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let raw = format!("{SAMPLE}\nfuture_option: true\n");
        assert!(load_config_from_str(&raw).is_ok());
    }

    #[test]
    fn empty_databases_are_rejected() {
        let raw = r#"
version: "1.0"
s3:
  bucket: b
databases: []
"#;
        assert_matches!(load_config_from_str(raw), Err(ConfigError::Invalid(_)));
    }

    #[test]
    fn filter_narrows_databases_and_tables() {
        let mut config = load_config_from_str(SAMPLE).unwrap();
        assert!(config.filter(Some("app"), Some("audit_logs")));
        assert_eq!(config.databases.len(), 1);

        let mut config = load_config_from_str(SAMPLE).unwrap();
        assert!(!config.filter(Some("app"), Some("nonexistent")));
    }

    #[test]
    fn compliance_bounds_are_enforced() {
        let raw = format!(
            "{SAMPLE}\ncompliance:\n  min_retention_days: 100\n  max_retention_days: 3650\n"
        );
        assert_matches!(
            load_config_from_str(&raw),
            Err(ConfigError::RetentionOutOfBounds { retention_days: 90, .. })
        );
    }
}
