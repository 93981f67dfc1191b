use std::{path::Path, sync::Arc};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::ObjectStoreError,
    multipart::{requires_multipart, MultipartUploader},
    rate_limiter::RateLimiter,
    raw::{ObjectHead, RawObjectStore},
    retries::{retry_with_limiter, RetryPolicy},
};

/// Result of a successful upload; `key` is the full resolved key including
/// the configured prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

/// The archiver's object-store client: joins the configured prefix, retries
/// transient failures with exponential backoff, throttles through a shared
/// token bucket, and routes large files through journaled multipart uploads.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    raw: Arc<dyn RawObjectStore>,
    bucket: String,
    prefix: String,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    journal_dir: std::path::PathBuf,
}

impl ArchiveStore {
    pub fn new(
        raw: Arc<dyn RawObjectStore>,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        requests_per_second: f64,
        max_retries: u16,
        journal_dir: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            raw,
            bucket: bucket.into(),
            prefix: prefix.into(),
            limiter: Arc::new(RateLimiter::new(requests_per_second)),
            retry: RetryPolicy::with_max_retries(max_retries),
            journal_dir: journal_dir.into(),
        }
    }

    /// Joins `key` with the configured prefix.
    pub fn resolve_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), key)
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Uploads a local file, choosing multipart for payloads at or above the
    /// multipart threshold. Multipart progress is journaled so a crashed
    /// upload resumes instead of restarting.
    pub async fn upload_file(
        &self,
        path: &Path,
        key: &str,
    ) -> Result<StoredObject, ObjectStoreError> {
        let resolved = self.resolve_key(key);
        let size = tokio::fs::metadata(path).await?.len();

        if requires_multipart(size) {
            let uploader =
                MultipartUploader::new(self.raw.as_ref(), &self.limiter, &self.journal_dir);
            let size = uploader.upload(path, &resolved).await?;
            return Ok(StoredObject {
                bucket: self.bucket.clone(),
                key: resolved,
                size,
            });
        }

        let bytes = tokio::fs::read(path).await?;
        self.put_bytes(key, bytes).await
    }

    /// Uploads an in-memory payload under the resolved key.
    pub async fn put_bytes(
        &self,
        key: &str,
        bytes: Vec<u8>,
    ) -> Result<StoredObject, ObjectStoreError> {
        let resolved = self.resolve_key(key);
        let size = bytes.len() as u64;
        retry_with_limiter(&self.retry, &self.limiter, "put_object", || {
            let raw = Arc::clone(&self.raw);
            let resolved = resolved.clone();
            let bytes = bytes.clone();
            async move { raw.put(&resolved, bytes).await }
        })
        .await?;
        Ok(StoredObject {
            bucket: self.bucket.clone(),
            key: resolved,
            size,
        })
    }

    pub async fn object_exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        match self.head_object(key).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::KeyNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn get_object_bytes(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let resolved = self.resolve_key(key);
        retry_with_limiter(&self.retry, &self.limiter, "get_object", || {
            let raw = Arc::clone(&self.raw);
            let resolved = resolved.clone();
            async move { raw.get(&resolved).await }
        })
        .await
    }

    pub async fn head_object(&self, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        let resolved = self.resolve_key(key);
        retry_with_limiter(&self.retry, &self.limiter, "head_object", || {
            let raw = Arc::clone(&self.raw);
            let resolved = resolved.clone();
            async move { raw.head(&resolved).await }
        })
        .await
    }

    /// Lists full resolved keys under the given (relative) prefix.
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let resolved = self.resolve_key(prefix);
        retry_with_limiter(&self.retry, &self.limiter, "list_objects", || {
            let raw = Arc::clone(&self.raw);
            let resolved = resolved.clone();
            async move { raw.list(&resolved).await }
        })
        .await
    }

    pub async fn delete_object(&self, key: &str) -> Result<(), ObjectStoreError> {
        let resolved = self.resolve_key(key);
        retry_with_limiter(&self.retry, &self.limiter, "delete_object", || {
            let raw = Arc::clone(&self.raw);
            let resolved = resolved.clone();
            async move { raw.delete(&resolved).await }
        })
        .await
    }

    /// Fetches and deserializes a JSON object; `None` when the key is absent.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ObjectStoreError> {
        match self.get_object_bytes(key).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ObjectStoreError::KeyNotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn put_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<StoredObject, ObjectStoreError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.put_bytes(key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_backed::FileBackedObjectStore;

    fn test_store(root: &Path) -> ArchiveStore {
        ArchiveStore::new(
            Arc::new(FileBackedObjectStore::new(root)),
            "test-bucket",
            "archives",
            1000.0,
            3,
            root.join(".journal"),
        )
    }

    #[tokio::test]
    async fn keys_are_prefixed_and_returned_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let stored = store.put_bytes("app/x.json", b"{}".to_vec()).await.unwrap();
        assert_eq!(stored.bucket, "test-bucket");
        assert_eq!(stored.key, "archives/app/x.json");
        assert_eq!(stored.size, 2);

        assert!(store.object_exists("app/x.json").await.unwrap());
        assert!(!store.object_exists("app/missing.json").await.unwrap());
    }

    #[tokio::test]
    async fn upload_file_small_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let file = dir.path().join("payload.jsonl.gz");
        tokio::fs::write(&file, b"payload").await.unwrap();

        let stored = store.upload_file(&file, "app/payload.jsonl.gz").await.unwrap();
        assert_eq!(stored.size, 7);
        assert_eq!(
            store.get_object_bytes("app/payload.jsonl.gz").await.unwrap(),
            b"payload"
        );
    }

    #[tokio::test]
    async fn json_round_trip_and_absent_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Doc {
            n: u32,
        }

        assert_eq!(store.get_json::<Doc>("doc.json").await.unwrap(), None);
        store.put_json("doc.json", &Doc { n: 7 }).await.unwrap();
        assert_eq!(
            store.get_json::<Doc>("doc.json").await.unwrap(),
            Some(Doc { n: 7 })
        );
    }

    #[tokio::test]
    async fn idempotent_upload_produces_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        store.put_bytes("k", vec![1, 2, 3]).await.unwrap();
        store.put_bytes("k", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get_object_bytes("k").await.unwrap(), vec![1, 2, 3]);
    }
}
