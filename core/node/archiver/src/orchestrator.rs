use std::{sync::Arc, time::Instant};

use archiver_config::{ArchiverConfig, DatabaseConfig};
use archiver_dal::ConnectionPool;
use archiver_object_store::ArchiveStore;
use tokio::{sync::watch, task::JoinSet};
use uuid::Uuid;

use crate::{
    error::ArchiverError,
    metrics::METRICS,
    stats::{RunStats, TableStats, TableStatus},
    table_archiver::TableArchiver,
};

/// Attempts per table for database-kind failures (connection drops, failed
/// selects). Everything else fails the table on the first attempt.
const TABLE_RETRY_ATTEMPTS: u32 = 3;

/// Fans the archival out across databases and tables. Databases run
/// sequentially or as spawned workers up to `max_parallel_databases`; tables
/// within a database always run sequentially because schema capture and
/// locking are per-table.
#[derive(Debug, Clone)]
pub struct Archiver {
    config: Arc<ArchiverConfig>,
    store: ArchiveStore,
    dry_run: bool,
}

impl Archiver {
    pub fn new(config: Arc<ArchiverConfig>, store: ArchiveStore, dry_run: bool) -> Self {
        Self {
            config,
            store,
            dry_run,
        }
    }

    pub async fn run(&self, stop_receiver: watch::Receiver<bool>) -> Result<RunStats, ArchiverError> {
        let started = Instant::now();
        let correlation_id = Uuid::new_v4().to_string();
        tracing::info!(
            correlation_id = %correlation_id,
            databases = self.config.databases.len(),
            dry_run = self.dry_run,
            "Starting archival run"
        );

        let mut run_stats = RunStats::default();
        let parallelism = if self.config.defaults.parallel_databases {
            self.config.defaults.max_parallel_databases.max(1)
        } else {
            1
        };

        // One worker task per database, at most `parallelism` in flight; the
        // next database is spawned as a slot frees up.
        let mut workers: JoinSet<Result<Vec<TableStats>, ArchiverError>> = JoinSet::new();
        let mut next_database = 0;

        while next_database < self.config.databases.len() || !workers.is_empty() {
            while workers.len() < parallelism && next_database < self.config.databases.len() {
                let this = self.clone();
                let stop_receiver = stop_receiver.clone();
                let correlation_id = correlation_id.clone();
                let database_index = next_database;
                workers.spawn(async move {
                    let db_config = &this.config.databases[database_index];
                    this.process_database(db_config, &stop_receiver, &correlation_id)
                        .await
                });
                next_database += 1;
            }

            if let Some(joined) = workers.join_next().await {
                let stats = joined.map_err(|err| {
                    ArchiverError::configuration(format!("database worker task failed: {err}"))
                })??;
                for table_stats in stats {
                    run_stats.push(table_stats);
                }
            }
        }

        run_stats.finalize(started.elapsed());
        tracing::info!(
            correlation_id = %correlation_id,
            records_archived = run_stats.records_archived,
            batches = run_stats.batches_processed,
            failures = run_stats.failures,
            duration_secs = run_stats.duration_secs,
            "Archival run finished"
        );
        Ok(run_stats)
    }

    /// One database: connect once, then archive its tables sequentially.
    /// A table failure is recorded and the remaining tables continue;
    /// configuration errors abort the whole run.
    async fn process_database(
        &self,
        db_config: &DatabaseConfig,
        stop_receiver: &watch::Receiver<bool>,
        correlation_id: &str,
    ) -> Result<Vec<TableStats>, ArchiverError> {
        let mut all_stats = Vec::with_capacity(db_config.tables.len());

        let pool_size = db_config.effective_pool_size(&self.config.defaults);
        let pool = match ConnectionPool::connect(db_config, pool_size).await {
            Ok(pool) => pool,
            Err(err) => {
                let err = ArchiverError::from(err);
                if matches!(err, ArchiverError::Configuration { .. }) {
                    return Err(err);
                }
                tracing::error!(database = %db_config.name, %err, "Cannot connect, skipping database");
                METRICS.errors.inc();
                for table in &db_config.tables {
                    all_stats.push(failed_stats(&db_config.name, &table.name, &err));
                }
                return Ok(all_stats);
            }
        };

        for table_config in &db_config.tables {
            if *stop_receiver.borrow() {
                let mut stats = TableStats::new(&db_config.name, &table_config.name);
                stats.status = TableStatus::Interrupted;
                all_stats.push(stats);
                continue;
            }
            let stats = self
                .process_table(db_config, table_config, &pool, stop_receiver, correlation_id)
                .await?;
            all_stats.push(stats);
        }

        pool.close().await;
        Ok(all_stats)
    }

    async fn process_table(
        &self,
        db_config: &DatabaseConfig,
        table_config: &archiver_config::TableConfig,
        pool: &ConnectionPool,
        stop_receiver: &watch::Receiver<bool>,
        correlation_id: &str,
    ) -> Result<TableStats, ArchiverError> {
        let mut attempt = 1;
        loop {
            let archiver = TableArchiver::new(
                &self.config,
                db_config,
                table_config,
                pool,
                &self.store,
                self.dry_run,
                correlation_id,
            );
            match archiver.run(stop_receiver).await {
                Ok(stats) => return Ok(stats),
                // Configuration problems poison the whole run.
                Err(err @ ArchiverError::Configuration { .. }) => return Err(err),
                // Database blips get a bounded number of fresh attempts; the
                // checkpoint makes the retry resume instead of restart.
                Err(err @ ArchiverError::Database { .. }) if attempt < TABLE_RETRY_ATTEMPTS => {
                    tracing::warn!(
                        database = %db_config.name,
                        table = %table_config.name,
                        attempt,
                        max_attempts = TABLE_RETRY_ATTEMPTS,
                        %err,
                        "Table archival failed on a database error, retrying"
                    );
                    attempt += 1;
                }
                // Lock contention and verification failures are fatal for
                // this table only.
                Err(err) => {
                    tracing::error!(
                        database = %db_config.name,
                        table = %table_config.name,
                        kind = err.kind(),
                        %err,
                        "Table archival failed"
                    );
                    METRICS.errors.inc();
                    return Ok(failed_stats(&db_config.name, &table_config.name, &err));
                }
            }
        }
    }
}

fn failed_stats(database: &str, table: &str, err: &ArchiverError) -> TableStats {
    let mut stats = TableStats::new(database, table);
    stats.status = TableStatus::Failed;
    stats.error = Some(err.to_string());
    stats
}
