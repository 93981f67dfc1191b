use archiver_config::{CheckpointConfig, CheckpointStorageType};
use archiver_object_store::ArchiveStore;
use archiver_types::{keys, Checkpoint};

use crate::error::ArchiverError;

/// Durable resumable progress. The object-store backend writes under the
/// table's `checkpoints/` prefix; the local backend writes JSON files into a
/// configured directory. A successful run deletes its checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    config: CheckpointConfig,
    store: ArchiveStore,
}

impl CheckpointStore {
    pub fn new(config: CheckpointConfig, store: ArchiveStore) -> Self {
        Self { config, store }
    }

    /// Whether a checkpoint is due after `batch_number` completed.
    pub fn should_save(&self, batch_number: u64) -> bool {
        self.config.enabled
            && self.config.frequency > 0
            && batch_number % self.config.frequency == 0
    }

    pub async fn load(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<Option<Checkpoint>, ArchiverError> {
        if !self.config.enabled {
            return Ok(None);
        }
        match self.config.storage_type {
            CheckpointStorageType::S3 => {
                let key = keys::checkpoint_key(database, schema, table);
                Ok(self.store.get_json(&key).await?)
            }
            CheckpointStorageType::Local => {
                let path = self.local_path(database, table);
                match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let checkpoint: Checkpoint =
                            serde_json::from_slice(&bytes).map_err(|err| {
                                ArchiverError::Serialization {
                                    message: format!(
                                        "corrupt checkpoint at {}: {err}",
                                        path.display()
                                    ),
                                    context: Default::default(),
                                }
                            })?;
                        Ok(Some(checkpoint))
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(ArchiverError::Serialization {
                        message: format!("cannot read checkpoint at {}: {err}", path.display()),
                        context: Default::default(),
                    }),
                }
            }
        }
    }

    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), ArchiverError> {
        if !self.config.enabled {
            return Ok(());
        }
        match self.config.storage_type {
            CheckpointStorageType::S3 => {
                let key = keys::checkpoint_key(
                    &checkpoint.database,
                    &checkpoint.schema_name,
                    &checkpoint.table,
                );
                self.store.put_json(&key, checkpoint).await?;
            }
            CheckpointStorageType::Local => {
                let path = self.local_path(&checkpoint.database, &checkpoint.table);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
                }
                let json = serde_json::to_vec_pretty(checkpoint).expect("checkpoint serialization");
                tokio::fs::write(&path, json).await.map_err(io_error)?;
            }
        }
        tracing::debug!(
            database = %checkpoint.database,
            table = %checkpoint.table,
            batch_number = checkpoint.batch_number,
            records_archived = checkpoint.records_archived,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Removes the checkpoint after a clean run; absence is not an error.
    pub async fn delete(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<(), ArchiverError> {
        if !self.config.enabled {
            return Ok(());
        }
        match self.config.storage_type {
            CheckpointStorageType::S3 => {
                let key = keys::checkpoint_key(database, schema, table);
                match self.store.delete_object(&key).await {
                    Ok(())
                    | Err(archiver_object_store::ObjectStoreError::KeyNotFound { .. }) => Ok(()),
                    Err(err) => Err(err.into()),
                }
            }
            CheckpointStorageType::Local => {
                match tokio::fs::remove_file(self.local_path(database, table)).await {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(err) => Err(io_error(err)),
                }
            }
        }
    }

    fn local_path(&self, database: &str, table: &str) -> std::path::PathBuf {
        self.config
            .local_path
            .join(keys::checkpoint_file_name(database, table))
    }
}

fn io_error(err: std::io::Error) -> ArchiverError {
    ArchiverError::Serialization {
        message: format!("checkpoint I/O failure: {err}"),
        context: Default::default(),
    }
}
