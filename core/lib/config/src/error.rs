use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("environment variable {name} referenced by config is not set")]
    MissingEnvVar { name: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(
        "retention for table {table} ({retention_days} days) is outside compliance bounds \
         [{min_days}, {max_days}]"
    )]
    RetentionOutOfBounds {
        table: String,
        retention_days: u32,
        min_days: u32,
        max_days: u32,
    },
}
