use std::time::Duration;

use sqlx::{PgConnection, Postgres, Transaction};
use tokio::task::JoinHandle;

use crate::{
    connection::ConnectionPool,
    error::{sqlstate_of, DalError},
    ident::quote_ident,
};

/// Opens timeout-bounded transactions for the delete phase.
#[derive(Debug, Clone)]
pub struct TransactionManager {
    timeout: Duration,
}

impl TransactionManager {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Begins a transaction with `SET LOCAL statement_timeout` and a
    /// background age monitor that warns at 50% of the timeout and logs an
    /// error at 100%.
    pub async fn begin<'a>(
        &self,
        pool: &ConnectionPool,
    ) -> Result<ArchiveTransaction<'a>, DalError> {
        let mut tx = pool
            .pool()
            .begin()
            .await
            .map_err(|err| transaction_error("failed to begin transaction", err))?;

        let timeout_ms = self.timeout.as_millis();
        let query = format!("SET LOCAL statement_timeout = {timeout_ms}");
        sqlx::query(&query)
            .execute(&mut *tx)
            .await
            .map_err(|err| transaction_error("failed to set statement_timeout", err))?;

        let timeout = self.timeout;
        let monitor = tokio::spawn(async move {
            tokio::time::sleep(timeout / 2).await;
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Transaction age passed 50% of its timeout"
            );
            tokio::time::sleep(timeout / 2).await;
            tracing::error!(
                timeout_secs = timeout.as_secs(),
                "Transaction exceeded its timeout"
            );
        });

        Ok(ArchiveTransaction {
            tx: Some(tx),
            monitor,
            savepoint_count: 0,
        })
    }
}

/// An open transaction. Dropping it without `commit` rolls back (sqlx
/// semantics); the age monitor is cancelled on every exit path.
#[derive(Debug)]
pub struct ArchiveTransaction<'a> {
    tx: Option<Transaction<'a, Postgres>>,
    monitor: JoinHandle<()>,
    savepoint_count: u32,
}

impl ArchiveTransaction<'_> {
    pub fn connection(&mut self) -> &mut PgConnection {
        self.tx.as_mut().expect("transaction already finished")
    }

    /// Creates a savepoint, auto-named `sp_1, sp_2, …` when no name is given.
    pub async fn savepoint(&mut self, name: Option<&str>) -> Result<String, DalError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                self.savepoint_count += 1;
                format!("sp_{}", self.savepoint_count)
            }
        };
        let quoted = quote_ident(&name)?;
        sqlx::query(&format!("SAVEPOINT {quoted}"))
            .execute(self.connection())
            .await
            .map_err(|err| transaction_error("failed to create savepoint", err))?;
        Ok(name)
    }

    pub async fn release_savepoint(&mut self, name: &str) -> Result<(), DalError> {
        let quoted = quote_ident(name)?;
        sqlx::query(&format!("RELEASE SAVEPOINT {quoted}"))
            .execute(self.connection())
            .await
            .map_err(|err| transaction_error("failed to release savepoint", err))?;
        Ok(())
    }

    pub async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DalError> {
        let quoted = quote_ident(name)?;
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {quoted}"))
            .execute(self.connection())
            .await
            .map_err(|err| transaction_error("failed to roll back to savepoint", err))?;
        Ok(())
    }

    pub async fn commit(mut self) -> Result<(), DalError> {
        self.monitor.abort();
        self.tx
            .take()
            .expect("transaction already finished")
            .commit()
            .await
            .map_err(|err| transaction_error("failed to commit transaction", err))
    }

    pub async fn rollback(mut self) -> Result<(), DalError> {
        self.monitor.abort();
        self.tx
            .take()
            .expect("transaction already finished")
            .rollback()
            .await
            .map_err(|err| transaction_error("failed to roll back transaction", err))
    }
}

impl Drop for ArchiveTransaction<'_> {
    fn drop(&mut self) {
        self.monitor.abort();
    }
}

fn transaction_error(context: &str, err: sqlx::Error) -> DalError {
    DalError::Transaction {
        sqlstate: sqlstate_of(&err),
        message: format!("{context}: {err}"),
    }
}
