use thiserror::Error;

#[derive(Debug, Error)]
pub enum DalError {
    #[error("failed to connect to database {database}: {source}")]
    Connection {
        database: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("configuration problem for database access: {message}")]
    Configuration { message: String },
    #[error("query failed on {database} ({query_prefix}): {source}")]
    Query {
        database: String,
        /// First characters of the statement, for error context without
        /// leaking bound values.
        query_prefix: String,
        sqlstate: Option<String>,
        #[source]
        source: sqlx::Error,
    },
    #[error("transaction failed (sqlstate {sqlstate:?}): {message}")]
    Transaction {
        message: String,
        sqlstate: Option<String>,
    },
    #[error("unsafe SQL identifier: {identifier:?}")]
    UnsafeIdentifier { identifier: String },
    #[error("unsupported primary key type {data_type} for column {column}")]
    UnsupportedPkType { column: String, data_type: String },
    #[error("column {column} missing from fetched row")]
    MissingColumn { column: String },
}

impl DalError {
    pub(crate) fn query(database: &str, query: &str, source: sqlx::Error) -> Self {
        DalError::Query {
            database: database.to_string(),
            query_prefix: query.chars().take(100).collect(),
            sqlstate: sqlstate_of(&source),
            source,
        }
    }

    /// SQLSTATE of the underlying driver failure, when there is one.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            DalError::Query { sqlstate, .. } | DalError::Transaction { sqlstate, .. } => {
                sqlstate.as_deref()
            }
            _ => None,
        }
    }
}

pub(crate) fn sqlstate_of(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code.to_string())
}
