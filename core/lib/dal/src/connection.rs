use std::time::Duration;

use archiver_config::DatabaseConfig;
use sqlx::{
    pool::PoolConnection,
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool, Postgres,
};

use crate::error::DalError;

/// Connection pool for one source database, min 1 / max `pool_size`
/// connections, tagged `audit_archiver` in `pg_stat_activity`.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    pool: PgPool,
    database: String,
}

impl ConnectionPool {
    pub async fn connect(config: &DatabaseConfig, pool_size: u32) -> Result<Self, DalError> {
        let password = config
            .password()
            .map_err(|err| DalError::Configuration {
                message: err.to_string(),
            })?;

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&password)
            .database(&config.name)
            .application_name("audit_archiver")
            // 60s command timeout, applied server-side per statement.
            .options([("statement_timeout", "60000")]);

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|source| DalError::Connection {
                database: config.name.clone(),
                source,
            })?;

        Ok(Self {
            pool,
            database: config.name.clone(),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DalError> {
        self.pool.acquire().await.map_err(|source| DalError::Connection {
            database: self.database.clone(),
            source,
        })
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
