use sha2::{Digest, Sha256};
use sqlx::{pool::PoolConnection, Connection as _, Postgres};

use crate::{connection::ConnectionPool, error::DalError};

/// 64-bit advisory lock key: the big-endian first 8 bytes of
/// `SHA-256(lock_key)`.
pub fn advisory_lock_key(lock_key: &str) -> i64 {
    let digest = Sha256::digest(lock_key.as_bytes());
    i64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

/// A held session-scoped advisory lock. The lock lives on this dedicated
/// connection; dropping the connection (or the session dying) releases it on
/// the server, which is exactly the stale-holder story we want.
#[derive(Debug)]
pub struct PgAdvisoryLock {
    conn: PoolConnection<Postgres>,
    key: i64,
    database: String,
}

impl ConnectionPool {
    /// Non-blocking acquisition; `None` when another session already holds
    /// the key.
    pub async fn try_advisory_lock(&self, key: i64) -> Result<Option<PgAdvisoryLock>, DalError> {
        let mut conn = self.acquire().await?;
        let query = "SELECT pg_try_advisory_lock($1)";
        let acquired: bool = sqlx::query_scalar(query)
            .bind(key)
            .fetch_one(&mut *conn)
            .await
            .map_err(|err| DalError::query(self.database(), query, err))?;

        if !acquired {
            return Ok(None);
        }
        Ok(Some(PgAdvisoryLock {
            conn,
            key,
            database: self.database().to_string(),
        }))
    }
}

impl PgAdvisoryLock {
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Heartbeat: proves the session is alive, which is what keeps a
    /// session-scoped advisory lock held.
    pub async fn keep_alive(&mut self) -> Result<(), DalError> {
        self.conn
            .ping()
            .await
            .map_err(|err| DalError::query(&self.database, "-- ping", err))
    }

    /// Releases the lock; returns the server's report of whether this
    /// session actually held it (idempotent release returns `false`).
    pub async fn release(mut self) -> Result<bool, DalError> {
        let query = "SELECT pg_advisory_unlock($1)";
        sqlx::query_scalar(query)
            .bind(self.key)
            .fetch_one(&mut *self.conn)
            .await
            .map_err(|err| DalError::query(&self.database, query, err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advisory_key_is_stable_and_distinct() {
        let a = advisory_lock_key("app/public.audit_logs");
        assert_eq!(a, advisory_lock_key("app/public.audit_logs"));
        assert_ne!(a, advisory_lock_key("app/public.other_table"));
        assert_ne!(a, advisory_lock_key("crm/public.audit_logs"));
    }
}
