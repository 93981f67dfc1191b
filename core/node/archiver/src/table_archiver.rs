use std::time::Instant;

use archiver_config::{ArchiverConfig, DatabaseConfig, TableConfig};
use archiver_dal::{
    calculate_cutoff_date, BatchSelectorDal, ConnectionPool, SchemaDal, TableColumnTypes,
    TableTarget, TransactionManager,
};
use archiver_object_store::ArchiveStore;
use archiver_types::{
    batch_id, keys, BatchInfo, BatchMetadata, Checkpoint, Checksums, Cursor, DataInfo,
    DeletionManifest, ManifestInfo, PrimaryKeySample, Row, SchemaDriftReport, TableSchema,
    TimestampRange, WIRE_FORMAT_VERSION,
};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::watch;

use crate::{
    checkpoint::CheckpointStore,
    checksum::{checksums_match, sha256_hex},
    compressor::Compressor,
    drift::compare_schemas,
    error::ArchiverError,
    locking::LockManager,
    metrics::METRICS,
    sample::SampleVerifier,
    serializer::RowSerializer,
    stats::{TableStats, TableStatus},
    verifier::Verifier,
    watermark::WatermarkStore,
};

/// Mutable archival progress for one table run; survives into the failure
/// path so a checkpoint can be written before the error propagates.
#[derive(Debug, Default)]
struct Progress {
    batch_number: u64,
    cursor: Option<Cursor>,
    records_archived: u64,
    batches_processed: u64,
    last_batch_id: Option<String>,
}

/// Archives one table: acquire the `(database, table)` lock, capture and
/// drift-check the schema, restore progress from checkpoint and watermark,
/// then run the batch loop until the keyset window is empty.
#[derive(Debug)]
pub struct TableArchiver<'a> {
    config: &'a ArchiverConfig,
    db_config: &'a DatabaseConfig,
    table_config: &'a TableConfig,
    pool: &'a ConnectionPool,
    store: &'a ArchiveStore,
    dry_run: bool,
    correlation_id: &'a str,
}

impl<'a> TableArchiver<'a> {
    pub fn new(
        config: &'a ArchiverConfig,
        db_config: &'a DatabaseConfig,
        table_config: &'a TableConfig,
        pool: &'a ConnectionPool,
        store: &'a ArchiveStore,
        dry_run: bool,
        correlation_id: &'a str,
    ) -> Self {
        Self {
            config,
            db_config,
            table_config,
            pool,
            store,
            dry_run,
            correlation_id,
        }
    }

    fn database(&self) -> &str {
        &self.db_config.name
    }

    fn schema(&self) -> &str {
        &self.table_config.schema
    }

    fn table(&self) -> &str {
        &self.table_config.name
    }

    fn err_context(&self, mut err: ArchiverError) -> ArchiverError {
        err = err
            .with_context("database", self.database())
            .with_context("table", self.table_config.qualified_name())
            .with_context("correlation_id", self.correlation_id);
        err
    }

    pub async fn run(
        &self,
        stop_receiver: &watch::Receiver<bool>,
    ) -> Result<TableStats, ArchiverError> {
        self.run_inner(stop_receiver)
            .await
            .map_err(|err| self.err_context(err))
    }

    async fn run_inner(
        &self,
        stop_receiver: &watch::Receiver<bool>,
    ) -> Result<TableStats, ArchiverError> {
        let started = Instant::now();
        let mut stats = TableStats::new(self.database(), self.table());

        // INIT: identifiers must be provably safe before any SQL is built,
        // and the cutoff is fixed once for the whole run.
        let target = TableTarget::from_config(self.table_config);
        target.validate()?;
        let retention_days = self
            .table_config
            .effective_retention_days(&self.config.defaults);
        let batch_size = self
            .table_config
            .effective_batch_size(&self.config.defaults);
        let cutoff = calculate_cutoff_date(retention_days, self.config.defaults.safety_buffer_days);

        let selector = BatchSelectorDal::new(self.pool, &target);
        let column_types = selector.probe_column_types().await?;

        tracing::info!(
            database = %self.database(),
            table = %self.table_config.qualified_name(),
            retention_days,
            batch_size,
            cutoff = %cutoff,
            dry_run = self.dry_run,
            "Starting table archival"
        );

        if self.dry_run {
            let eligible = selector.count_eligible_records(cutoff, column_types).await?;
            stats.status = TableStatus::DryRun;
            stats.records_would_archive = Some(eligible.max(0) as u64);
            stats.duration_secs = started.elapsed().as_secs_f64();
            tracing::info!(
                table = %self.table_config.qualified_name(),
                records_would_archive = eligible,
                "Dry run complete, no data was modified"
            );
            return Ok(stats);
        }

        // LOCKING: exactly one live archiver per (database, table).
        let lock_manager = LockManager::new(self.config.locking.clone());
        let lock_key = format!("{}/{}", self.database(), self.table_config.qualified_name());
        let lock = lock_manager.acquire(&lock_key, Some(self.pool)).await?;
        let lock_guard = lock_manager.start_heartbeat(lock);

        let checkpoint_store =
            CheckpointStore::new(self.config.checkpoint.clone(), self.store.clone());
        let mut progress = Progress::default();
        let result = self
            .run_locked(
                &selector,
                column_types,
                cutoff,
                batch_size,
                &checkpoint_store,
                &mut progress,
                &mut stats,
                stop_receiver,
            )
            .await;

        let release_result = lock_manager.release(lock_guard).await;

        match result {
            Ok(()) => {}
            Err(err) => {
                METRICS.errors.inc();
                // Failure checkpoint: the next run resumes from here.
                let checkpoint = self.checkpoint_from_progress(&progress);
                if let Err(save_err) = checkpoint_store.save(&checkpoint).await {
                    tracing::warn!(%save_err, "Failed to save failure checkpoint");
                }
                return Err(err);
            }
        }
        release_result?;

        stats.duration_secs = started.elapsed().as_secs_f64();
        tracing::info!(
            database = %self.database(),
            table = %self.table_config.qualified_name(),
            records_archived = stats.records_archived,
            batches = stats.batches_processed,
            bytes_uploaded = stats.bytes_uploaded,
            duration_secs = stats.duration_secs,
            "Table archival finished"
        );
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_locked(
        &self,
        selector: &BatchSelectorDal<'_>,
        column_types: TableColumnTypes,
        cutoff: DateTime<Utc>,
        batch_size: u32,
        checkpoint_store: &CheckpointStore,
        progress: &mut Progress,
        stats: &mut TableStats,
        stop_receiver: &watch::Receiver<bool>,
    ) -> Result<(), ArchiverError> {
        // SCHEMA: capture, drift-check against the previous run, persist the
        // new snapshot for the next run.
        let schema_dal = SchemaDal::new(self.pool);
        let current_schema = schema_dal
            .detect_table_schema(self.schema(), self.table())
            .await?;
        let schema_key = keys::schema_key(self.database(), self.schema(), self.table());
        let previous_schema: Option<TableSchema> = self.store.get_json(&schema_key).await?;
        let fail_on_drift = self
            .config
            .compliance
            .as_ref()
            .is_some_and(|compliance| compliance.fail_on_schema_drift);
        let drift = compare_schemas(&current_schema, previous_schema.as_ref(), fail_on_drift)?;
        self.store.put_json(&schema_key, &current_schema).await?;

        // LOAD_CHECKPOINT: seed batch numbering from the checkpoint and the
        // cursor from whichever of checkpoint/watermark is further along.
        let watermark_store = WatermarkStore::new(self.store.clone());
        let checkpoint = checkpoint_store
            .load(self.database(), self.schema(), self.table())
            .await?;
        let watermark = watermark_store
            .load(self.database(), self.schema(), self.table())
            .await?;

        if let Some(checkpoint) = &checkpoint {
            progress.batch_number = checkpoint.batch_number;
            progress.records_archived = checkpoint.records_archived;
            progress.batches_processed = checkpoint.batches_processed;
            tracing::info!(
                batch_number = checkpoint.batch_number,
                records_archived = checkpoint.records_archived,
                "Resuming from checkpoint"
            );
        }
        let checkpoint_cursor = checkpoint
            .as_ref()
            .and_then(|checkpoint| checkpoint.cursor(column_types.pk_type));
        let watermark_cursor = watermark
            .as_ref()
            .and_then(|watermark| watermark.cursor(column_types.pk_type));
        progress.cursor = later_cursor(watermark_cursor, checkpoint_cursor);

        // LOOP
        let serializer = RowSerializer::new();
        let compressor = Compressor::default();
        let verifier = Verifier::new();
        let sampler = SampleVerifier::new(&self.config.monitoring);
        let tx_manager = TransactionManager::new(std::time::Duration::from_secs(
            self.config.transaction_timeout_seconds,
        ));
        let sleep_between_batches =
            std::time::Duration::from_millis(self.config.defaults.sleep_between_batches_ms);
        let mut batches_this_run = 0u64;

        loop {
            // Cancellation is honored only between batches.
            if *stop_receiver.borrow() {
                tracing::info!("Stop signal received, interrupting table archival");
                stats.status = TableStatus::Interrupted;
                return Ok(());
            }

            let rows = selector
                .select_batch(
                    i64::from(batch_size),
                    cutoff,
                    progress.cursor.as_ref(),
                    column_types,
                )
                .await?;
            if rows.is_empty() {
                break;
            }

            progress.batch_number += 1;
            let first_batch_schema = (batches_this_run == 0).then_some((&current_schema, &drift));
            self.process_batch(
                selector,
                column_types,
                &serializer,
                &compressor,
                &verifier,
                &sampler,
                &tx_manager,
                &watermark_store,
                rows,
                first_batch_schema,
                progress,
                stats,
            )
            .await?;
            batches_this_run += 1;

            if checkpoint_store.should_save(progress.batch_number) {
                checkpoint_store
                    .save(&self.checkpoint_from_progress(progress))
                    .await?;
            }
            if !sleep_between_batches.is_zero() {
                tokio::time::sleep(sleep_between_batches).await;
            }
        }

        // DONE: a finished table needs no resume state.
        checkpoint_store
            .delete(self.database(), self.schema(), self.table())
            .await?;
        if self.config.defaults.vacuum_after && stats.records_archived > 0 {
            tracing::info!(
                table = %self.table_config.qualified_name(),
                records_deleted = stats.records_archived,
                "Deletions complete; run VACUUM ANALYZE on this table during a maintenance window"
            );
        }
        Ok(())
    }

    /// Steps 1-15 of the per-batch algorithm. The DELETE only runs after the
    /// uploaded object has been re-read and both checksums verified.
    #[allow(clippy::too_many_arguments)]
    async fn process_batch(
        &self,
        selector: &BatchSelectorDal<'_>,
        column_types: TableColumnTypes,
        serializer: &RowSerializer,
        compressor: &Compressor,
        verifier: &Verifier,
        sampler: &SampleVerifier,
        tx_manager: &TransactionManager,
        watermark_store: &WatermarkStore,
        rows: Vec<Row>,
        first_batch_schema: Option<(&TableSchema, &SchemaDriftReport)>,
        progress: &mut Progress,
        stats: &mut TableStats,
    ) -> Result<(), ArchiverError> {
        let batch_started = Instant::now();
        let batch_id = batch_id(self.database(), self.table(), progress.batch_number);
        let archived_at = Utc::now();
        let with_batch =
            |err: ArchiverError| err.with_context("batch_id", batch_id.as_str());

        // Step 2: memory representation.
        let memory_pks = selector.extract_primary_keys(&rows)?;
        let memory_count = rows.len() as u64;

        // Step 3: serialize and cross-check the line count.
        let records: Vec<JsonValue> = rows
            .iter()
            .map(|row| {
                serializer.serialize_row(
                    row,
                    &batch_id,
                    self.database(),
                    self.table(),
                    archived_at,
                )
            })
            .collect();
        let jsonl = serializer.to_jsonl(&records);
        let jsonl_line_count = serializer.count_jsonl_lines(&jsonl);
        if jsonl_line_count != memory_count {
            return Err(with_batch(ArchiverError::verification(format!(
                "serialized line count ({jsonl_line_count}) != fetched row count ({memory_count})"
            ))));
        }
        let jsonl_checksum = sha256_hex(&jsonl);

        // Step 4: compress.
        let (compressed, uncompressed_size, compressed_size) =
            compressor.compress(&jsonl).map_err(with_batch)?;
        let compressed_checksum = sha256_hex(&compressed);

        // Step 5: upload. The key is deterministic, so a batch replayed
        // after a rolled-back delete collides here; verify the existing
        // object instead of blindly re-uploading. Replays re-serialize with
        // a fresh `_archived_at`, so byte equality cannot be assumed even
        // for the same rows; row-set equality is the overwrite criterion.
        let date = archived_at.date_naive();
        let archive_key =
            keys::archive_key(self.database(), self.schema(), self.table(), date, &batch_id);
        let upload_started = Instant::now();
        if self.store.object_exists(&archive_key).await? {
            let existing = self.store.get_object_bytes(&archive_key).await?;
            if checksums_match(&sha256_hex(&existing), &compressed_checksum) {
                tracing::info!(
                    batch_id = %batch_id,
                    key = %archive_key,
                    "Archive object already exists with matching checksum, reusing"
                );
            } else {
                let existing_jsonl = compressor.decompress(&existing).map_err(with_batch)?;
                let existing_pks = extract_pks_from_jsonl(
                    &existing_jsonl,
                    &self.table_config.primary_key,
                    column_types.pk_type,
                );
                if verifier
                    .verify_primary_keys(&existing_pks, &memory_pks)
                    .is_err()
                {
                    // The existing object holds rows this run did not
                    // select. Overwriting it would destroy their only copy.
                    return Err(with_batch(
                        ArchiverError::verification(
                            "archive key collision with a different row set",
                        )
                        .with_context("key", archive_key.as_str()),
                    ));
                }
                tracing::warn!(
                    batch_id = %batch_id,
                    key = %archive_key,
                    "Archive object exists for the same row set, replacing with this serialization"
                );
                self.upload_archive(&archive_key, &batch_id, &compressed).await?;
            }
        } else {
            self.upload_archive(&archive_key, &batch_id, &compressed).await?;
        }
        METRICS.upload_latency.observe(upload_started.elapsed());

        // Step 6: re-download and verify both checksums end to end.
        let downloaded = self.store.get_object_bytes(&archive_key).await?;
        if !checksums_match(&sha256_hex(&downloaded), &compressed_checksum) {
            return Err(with_batch(
                ArchiverError::verification("uploaded archive checksum mismatch")
                    .with_context("expected_sha256", compressed_checksum.as_str()),
            ));
        }
        let decompressed = compressor.decompress(&downloaded).map_err(with_batch)?;
        if !checksums_match(&sha256_hex(&decompressed), &jsonl_checksum) {
            return Err(with_batch(
                ArchiverError::verification("decompressed archive checksum mismatch")
                    .with_context("expected_sha256", jsonl_checksum.as_str()),
            ));
        }

        // Step 7: metadata sidecar and deletion manifest.
        let pk_json: Vec<JsonValue> = memory_pks.iter().map(|pk| pk.to_json()).collect();
        let (min_ts, max_ts) = selector.get_timestamp_range(&rows);
        let metadata = BatchMetadata {
            version: WIRE_FORMAT_VERSION.to_string(),
            batch_info: BatchInfo {
                database: self.database().to_string(),
                schema: self.schema().to_string(),
                table: self.table().to_string(),
                batch_number: progress.batch_number,
                batch_id: batch_id.clone(),
                archived_at,
            },
            data_info: DataInfo::new(memory_count, uncompressed_size, compressed_size),
            checksums: Checksums {
                jsonl_sha256: jsonl_checksum.clone(),
                compressed_sha256: compressed_checksum.clone(),
            },
            primary_keys: PrimaryKeySample::from_keys(&pk_json),
            timestamp_range: Some(TimestampRange {
                min: min_ts,
                max: max_ts,
            }),
            table_schema: first_batch_schema.map(|(schema, _)| schema.clone()),
            schema_drift: first_batch_schema
                .and_then(|(_, drift)| drift.has_drift.then(|| drift.clone())),
        };
        let metadata_key =
            keys::metadata_key(self.database(), self.schema(), self.table(), date, &batch_id);
        self.store.put_json(&metadata_key, &metadata).await?;

        // The manifest records the intended deletion; the in-transaction
        // count verification below guarantees the actual count equals it on
        // every committed batch.
        let manifest = DeletionManifest::new(
            ManifestInfo {
                database: self.database().to_string(),
                schema: self.schema().to_string(),
                table: self.table().to_string(),
                batch_number: progress.batch_number,
                batch_id: batch_id.clone(),
                primary_key_column: self.table_config.primary_key.clone(),
                deleted_at: archived_at,
            },
            pk_json,
            memory_count,
        );
        let manifest_key =
            keys::manifest_key(self.database(), self.schema(), self.table(), date, &batch_id);
        self.store.put_json(&manifest_key, &manifest).await?;

        // Step 8: sampled keys must be present in the uploaded object.
        let sample_pks = sampler.select_samples(&memory_pks);
        sampler
            .verify_pks_in_archive(&decompressed, &self.table_config.primary_key, &sample_pks)
            .map_err(with_batch)?;

        // The key set in the serialized records must equal the delete list.
        let serialized_pks: Vec<archiver_types::PkValue> = records
            .iter()
            .filter_map(|record| record.get(&self.table_config.primary_key))
            .filter_map(|value| archiver_types::PkValue::from_json(value, column_types.pk_type))
            .collect();
        verifier
            .verify_primary_keys(&serialized_pks, &memory_pks)
            .map_err(with_batch)?;

        // Steps 9-11: transactional delete with count verification.
        let delete_started = Instant::now();
        let mut transaction = tx_manager.begin(self.pool).await?;
        let db_deleted_count = match selector
            .delete_by_primary_keys(transaction.connection(), &memory_pks, column_types.pk_type)
            .await
        {
            Ok(count) => count,
            Err(err) => {
                if let Err(rollback_err) = transaction.rollback().await {
                    tracing::warn!(%rollback_err, "Rollback after failed delete also failed");
                }
                return Err(with_batch(err.into()));
            }
        };
        if let Err(err) = verifier.verify_counts(db_deleted_count, memory_count, jsonl_line_count) {
            if let Err(rollback_err) = transaction.rollback().await {
                tracing::warn!(%rollback_err, "Rollback after count mismatch also failed");
            }
            return Err(with_batch(err));
        }
        transaction.commit().await?;
        METRICS.delete_latency.observe(delete_started.elapsed());

        // Step 12: sampled keys must now be absent from the source.
        sampler
            .verify_absent_from_source(selector, column_types.pk_type, &sample_pks)
            .await
            .map_err(with_batch)?;

        // Step 13: advance the watermark (strictly after commit).
        let cursor = selector
            .get_last_cursor(&rows)?
            .expect("non-empty batch has a cursor");
        watermark_store
            .save(self.database(), self.schema(), self.table(), &cursor)
            .await?;
        progress.cursor = Some(cursor);

        progress.records_archived += memory_count;
        progress.batches_processed += 1;
        progress.last_batch_id = Some(batch_id.clone());
        stats.records_archived += memory_count;
        stats.batches_processed += 1;
        stats.bytes_uploaded += compressed_size;

        METRICS.records_archived.inc_by(memory_count);
        METRICS.batches_processed.inc();
        METRICS.bytes_uploaded.inc_by(compressed_size);
        METRICS.last_processed_batch.set(progress.batch_number as usize);
        METRICS.batch_latency.observe(batch_started.elapsed());

        tracing::info!(
            batch_id = %batch_id,
            batch_number = progress.batch_number,
            records = memory_count,
            compressed_bytes = compressed_size,
            latency_ms = batch_started.elapsed().as_millis() as u64,
            "Batch archived and deleted"
        );
        Ok(())
    }

    /// Writes the compressed archive through a temporary file so oversized
    /// batches take the journaled multipart path. The temporary is removed
    /// on every exit path.
    async fn upload_archive(
        &self,
        archive_key: &str,
        batch_id: &str,
        compressed: &[u8],
    ) -> Result<(), ArchiverError> {
        let tmp_path = std::env::temp_dir().join(format!("audit_archiver_{batch_id}.jsonl.gz"));
        tokio::fs::write(&tmp_path, compressed)
            .await
            .map_err(|err| ArchiverError::from(archiver_object_store::ObjectStoreError::from(err)))?;
        let upload_result = self.store.upload_file(&tmp_path, archive_key).await;
        if let Err(remove_err) = tokio::fs::remove_file(&tmp_path).await {
            tracing::warn!(%remove_err, path = %tmp_path.display(), "Failed to remove temporary archive file");
        }
        upload_result?;
        Ok(())
    }

    fn checkpoint_from_progress(&self, progress: &Progress) -> Checkpoint {
        Checkpoint {
            database: self.database().to_string(),
            schema_name: self.schema().to_string(),
            table: self.table().to_string(),
            batch_number: progress.batch_number,
            last_timestamp: progress.cursor.as_ref().map(|cursor| cursor.last_timestamp),
            last_primary_key: progress
                .cursor
                .as_ref()
                .map(|cursor| cursor.last_primary_key.to_json()),
            records_archived: progress.records_archived,
            batches_processed: progress.batches_processed,
            checkpoint_time: Utc::now(),
            batch_id: progress.last_batch_id.clone(),
        }
    }
}

/// Primary keys of every record in a JSONL buffer, typed against the probed
/// key column.
fn extract_pks_from_jsonl(
    jsonl: &[u8],
    primary_key_column: &str,
    pk_type: archiver_types::PkType,
) -> Vec<archiver_types::PkValue> {
    let Ok(text) = std::str::from_utf8(jsonl) else {
        return Vec::new();
    };
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| serde_json::from_str::<JsonValue>(line).ok())
        .filter_map(|record| {
            record
                .get(primary_key_column)
                .and_then(|value| archiver_types::PkValue::from_json(value, pk_type))
        })
        .collect()
}

/// The lexicographically later of two cursors; the watermark and checkpoint
/// can disagree by at most the batches since the last checkpoint write.
fn later_cursor(a: Option<Cursor>, b: Option<Cursor>) -> Option<Cursor> {
    use archiver_types::PkValue;

    fn pk_after(a: &PkValue, b: &PkValue) -> bool {
        match (a, b) {
            (PkValue::Int(a), PkValue::Int(b)) => a > b,
            (a, b) => a.to_string() > b.to_string(),
        }
    }

    match (a, b) {
        (Some(a), Some(b)) => {
            let b_is_later = b.last_timestamp > a.last_timestamp
                || (b.last_timestamp == a.last_timestamp
                    && pk_after(&b.last_primary_key, &a.last_primary_key));
            Some(if b_is_later { b } else { a })
        }
        (a, b) => a.or(b),
    }
}
