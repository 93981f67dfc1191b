use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::{
    error::ObjectStoreError,
    rate_limiter::RateLimiter,
    raw::{PartEtag, RawObjectStore},
};

/// Files at or above this size go through the multipart path.
pub const MULTIPART_THRESHOLD_BYTES: u64 = 100 * 1024 * 1024;
/// S3 lower bound for non-final parts.
pub const MIN_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024;
/// S3 upper bound for a single part (and a single PUT).
pub const MAX_PART_SIZE_BYTES: u64 = 5 * 1024 * 1024 * 1024;
const MAX_PARTS: u64 = 10_000;

pub fn requires_multipart(total_size: u64) -> bool {
    total_size >= MULTIPART_THRESHOLD_BYTES || total_size > MAX_PART_SIZE_BYTES
}

/// `max(5 MiB, ceil(size / 10000))`, capped at 5 GiB.
pub fn part_size_for(total_size: u64) -> u64 {
    total_size
        .div_ceil(MAX_PARTS)
        .max(MIN_PART_SIZE_BYTES)
        .min(MAX_PART_SIZE_BYTES)
}

/// On-disk journal of an in-flight multipart upload. Persisted after every
/// part so a crashed process resumes from the first missing part instead of
/// re-transferring the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultipartUploadState {
    pub upload_id: String,
    pub key: String,
    pub file_path: PathBuf,
    pub part_size: u64,
    pub total_parts: u64,
    pub uploaded_parts: Vec<PartEtag>,
}

impl MultipartUploadState {
    pub async fn save(&self, state_file: &Path) -> Result<(), ObjectStoreError> {
        if let Some(parent) = state_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(state_file, json).await?;
        Ok(())
    }

    pub async fn load(state_file: &Path) -> Result<Option<Self>, ObjectStoreError> {
        match tokio::fs::read(state_file).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn has_part(&self, part_number: i32) -> bool {
        self.uploaded_parts
            .iter()
            .any(|part| part.part_number == part_number)
    }
}

/// Drives journaled multipart uploads against a raw store.
#[derive(Debug)]
pub struct MultipartUploader<'a> {
    store: &'a dyn RawObjectStore,
    limiter: &'a RateLimiter,
    journal_dir: PathBuf,
}

impl<'a> MultipartUploader<'a> {
    pub fn new(
        store: &'a dyn RawObjectStore,
        limiter: &'a RateLimiter,
        journal_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            limiter,
            journal_dir: journal_dir.into(),
        }
    }

    fn journal_path(&self, key: &str) -> PathBuf {
        self.journal_dir
            .join(format!("{}.upload.json", key.replace('/', "_")))
    }

    /// Uploads `file_path` to `key`, resuming a previous attempt when a
    /// matching journal exists. A terminal failure aborts the upload at the
    /// store and removes the journal.
    pub async fn upload(&self, file_path: &Path, key: &str) -> Result<u64, ObjectStoreError> {
        let total_size = tokio::fs::metadata(file_path).await?.len();
        let journal_path = self.journal_path(key);

        let mut state = match MultipartUploadState::load(&journal_path).await? {
            Some(state)
                if state.key == key
                    && state.file_path == file_path
                    && state.part_size == part_size_for(total_size) =>
            {
                tracing::info!(
                    key,
                    upload_id = %state.upload_id,
                    uploaded = state.uploaded_parts.len(),
                    total = state.total_parts,
                    "Resuming multipart upload from journal"
                );
                state
            }
            _ => {
                let part_size = part_size_for(total_size);
                let upload_id = self.store.create_multipart(key).await?;
                let state = MultipartUploadState {
                    upload_id,
                    key: key.to_string(),
                    file_path: file_path.to_path_buf(),
                    part_size,
                    total_parts: total_size.div_ceil(part_size).max(1),
                    uploaded_parts: Vec::new(),
                };
                state.save(&journal_path).await?;
                state
            }
        };

        match self.upload_parts(&mut state, file_path, &journal_path).await {
            Ok(()) => {
                let _ = tokio::fs::remove_file(&journal_path).await;
                Ok(total_size)
            }
            Err(err) => {
                tracing::error!(key, %err, "Multipart upload failed terminally, aborting");
                if let Err(abort_err) = self
                    .store
                    .abort_multipart(key, &state.upload_id)
                    .await
                {
                    tracing::warn!(key, %abort_err, "Failed to abort multipart upload");
                }
                let _ = tokio::fs::remove_file(&journal_path).await;
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        state: &mut MultipartUploadState,
        file_path: &Path,
        journal_path: &Path,
    ) -> Result<(), ObjectStoreError> {
        let mut file = tokio::fs::File::open(file_path).await?;

        for part_number in 1..=state.total_parts as i32 {
            if state.has_part(part_number) {
                continue;
            }
            let offset = (part_number as u64 - 1) * state.part_size;
            file.seek(std::io::SeekFrom::Start(offset)).await?;
            let mut buffer = vec![0u8; state.part_size as usize];
            let mut filled = 0;
            while filled < buffer.len() {
                let read = file.read(&mut buffer[filled..]).await?;
                if read == 0 {
                    break;
                }
                filled += read;
            }
            buffer.truncate(filled);

            self.limiter.acquire(1.0, true).await;
            let etag = self
                .store
                .put_part(&state.key, &state.upload_id, part_number, buffer)
                .await?;
            state.uploaded_parts.push(etag);
            state.save(journal_path).await?;
        }

        state
            .uploaded_parts
            .sort_by_key(|part| part.part_number);
        self.limiter.acquire(1.0, true).await;
        self.store
            .complete_multipart(&state.key, &state.upload_id, &state.uploaded_parts)
            .await
    }
}
