use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ObjectStoreError;

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectHead {
    pub key: String,
    pub size: u64,
}

/// A completed multipart part; journaled to disk between parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartEtag {
    pub part_number: i32,
    pub etag: String,
}

/// Transport-level store operations, deliberately policy-free: no retries,
/// no rate limiting, no prefixing. [`crate::ArchiveStore`] owns the policy.
#[async_trait]
pub trait RawObjectStore: fmt::Debug + Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;

    async fn head(&self, key: &str) -> Result<ObjectHead, ObjectStoreError>;

    /// Keys under `prefix`, unordered.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;

    /// Starts a multipart upload, returning its resumable upload id.
    async fn create_multipart(&self, key: &str) -> Result<String, ObjectStoreError>;

    async fn put_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<PartEtag, ObjectStoreError>;

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartEtag],
    ) -> Result<(), ObjectStoreError>;

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), ObjectStoreError>;
}
