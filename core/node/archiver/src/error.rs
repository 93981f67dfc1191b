use std::collections::BTreeMap;

use archiver_config::ConfigError;
use archiver_dal::DalError;
use archiver_object_store::ObjectStoreError;
use thiserror::Error;

/// Structured error context: database, table, batch id, counts and sizes,
/// correlation id. Rendered alongside the message wherever the error
/// surfaces.
pub type ErrorContext = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error("configuration error: {message} {context:?}")]
    Configuration {
        message: String,
        context: ErrorContext,
    },
    #[error("database error: {source} {context:?}")]
    Database {
        #[source]
        source: DalError,
        context: ErrorContext,
    },
    #[error("object store error: {source} {context:?}")]
    ObjectStore {
        #[source]
        source: ObjectStoreError,
        context: ErrorContext,
    },
    #[error("verification failed: {message} {context:?}")]
    Verification {
        message: String,
        context: ErrorContext,
    },
    #[error("lock error: {message} {context:?}")]
    Lock {
        message: String,
        context: ErrorContext,
    },
    #[error("transaction error (sqlstate {sqlstate:?}): {message} {context:?}")]
    Transaction {
        message: String,
        sqlstate: Option<String>,
        context: ErrorContext,
    },
    #[error("compression error: {message} {context:?}")]
    Compression {
        message: String,
        context: ErrorContext,
    },
    #[error("serialization error: {message} {context:?}")]
    Serialization {
        message: String,
        context: ErrorContext,
    },
}

impl ArchiverError {
    pub fn verification(message: impl Into<String>) -> Self {
        ArchiverError::Verification {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn lock(message: impl Into<String>) -> Self {
        ArchiverError::Lock {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ArchiverError::Configuration {
            message: message.into(),
            context: ErrorContext::new(),
        }
    }

    /// Attaches one context entry, preserving everything already present.
    pub fn with_context(mut self, key: &str, value: impl Into<String>) -> Self {
        self.context_mut().insert(key.to_string(), value.into());
        self
    }

    pub fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            ArchiverError::Configuration { context, .. }
            | ArchiverError::Database { context, .. }
            | ArchiverError::ObjectStore { context, .. }
            | ArchiverError::Verification { context, .. }
            | ArchiverError::Lock { context, .. }
            | ArchiverError::Transaction { context, .. }
            | ArchiverError::Compression { context, .. }
            | ArchiverError::Serialization { context, .. } => context,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            ArchiverError::Configuration { context, .. }
            | ArchiverError::Database { context, .. }
            | ArchiverError::ObjectStore { context, .. }
            | ArchiverError::Verification { context, .. }
            | ArchiverError::Lock { context, .. }
            | ArchiverError::Transaction { context, .. }
            | ArchiverError::Compression { context, .. }
            | ArchiverError::Serialization { context, .. } => context,
        }
    }

    /// Abstract error kind, used by the propagation policy and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ArchiverError::Configuration { .. } => "configuration",
            ArchiverError::Database { .. } => "database",
            ArchiverError::ObjectStore { .. } => "object_store",
            ArchiverError::Verification { .. } => "verification",
            ArchiverError::Lock { .. } => "lock",
            ArchiverError::Transaction { .. } => "transaction",
            ArchiverError::Compression { .. } => "compression",
            ArchiverError::Serialization { .. } => "serialization",
        }
    }
}

impl From<DalError> for ArchiverError {
    fn from(source: DalError) -> Self {
        match source {
            DalError::UnsafeIdentifier { identifier } => ArchiverError::Configuration {
                message: format!("unsafe SQL identifier: {identifier:?}"),
                context: ErrorContext::new(),
            },
            DalError::Configuration { message } => ArchiverError::Configuration {
                message,
                context: ErrorContext::new(),
            },
            DalError::Transaction { message, sqlstate } => ArchiverError::Transaction {
                message,
                sqlstate,
                context: ErrorContext::new(),
            },
            source => ArchiverError::Database {
                source,
                context: ErrorContext::new(),
            },
        }
    }
}

impl From<ObjectStoreError> for ArchiverError {
    fn from(source: ObjectStoreError) -> Self {
        ArchiverError::ObjectStore {
            source,
            context: ErrorContext::new(),
        }
    }
}

impl From<ConfigError> for ArchiverError {
    fn from(source: ConfigError) -> Self {
        ArchiverError::Configuration {
            message: source.to_string(),
            context: ErrorContext::new(),
        }
    }
}
