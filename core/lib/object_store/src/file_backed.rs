use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::ObjectStoreError,
    raw::{ObjectHead, PartEtag, RawObjectStore},
};

/// Directory-backed store used by tests and local runs. Multipart parts are
/// staged as individual files, which makes interrupted uploads genuinely
/// resumable from the first missing part.
#[derive(Debug)]
pub struct FileBackedObjectStore {
    root: PathBuf,
}

impl FileBackedObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn staging_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(".multipart").join(upload_id)
    }

    async fn ensure_parent(path: &Path) -> Result<(), ObjectStoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn not_found(key: &str) -> ObjectStoreError {
        ObjectStoreError::KeyNotFound {
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl RawObjectStore for FileBackedObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        let path = self.object_path(key);
        Self::ensure_parent(&path).await?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        match tokio::fs::read(self.object_path(key)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn head(&self, key: &str) -> Result<ObjectHead, ObjectStoreError> {
        match tokio::fs::metadata(self.object_path(key)).await {
            Ok(meta) => Ok(ObjectHead {
                key: key.to_string(),
                size: meta.len(),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let mut keys = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.file_name() == Some(std::ffi::OsStr::new(".multipart")) {
                    continue;
                }
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    let key = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        match tokio::fs::remove_file(self.object_path(key)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Self::not_found(key)),
            Err(err) => Err(err.into()),
        }
    }

    async fn create_multipart(&self, _key: &str) -> Result<String, ObjectStoreError> {
        let upload_id = Uuid::new_v4().to_string();
        tokio::fs::create_dir_all(self.staging_dir(&upload_id)).await?;
        Ok(upload_id)
    }

    async fn put_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        bytes: Vec<u8>,
    ) -> Result<PartEtag, ObjectStoreError> {
        let staging = self.staging_dir(upload_id);
        let etag = format!("part-{part_number}-{}", bytes.len());
        tokio::fs::write(staging.join(format!("part-{part_number:05}")), bytes).await?;
        Ok(PartEtag { part_number, etag })
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartEtag],
    ) -> Result<(), ObjectStoreError> {
        let staging = self.staging_dir(upload_id);
        let mut sorted = parts.to_vec();
        sorted.sort_by_key(|part| part.part_number);

        let mut assembled = Vec::new();
        for part in &sorted {
            let part_path = staging.join(format!("part-{:05}", part.part_number));
            let mut bytes = tokio::fs::read(&part_path).await?;
            assembled.append(&mut bytes);
        }
        self.put(key, assembled).await?;
        tokio::fs::remove_dir_all(&staging).await?;
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<(), ObjectStoreError> {
        match tokio::fs::remove_dir_all(self.staging_dir(upload_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn put_get_head_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedObjectStore::new(dir.path());

        store
            .put("app/public.audit_logs/watermark.json", b"{}".to_vec())
            .await
            .unwrap();
        let bytes = store.get("app/public.audit_logs/watermark.json").await.unwrap();
        assert_eq!(bytes, b"{}");

        let head = store.head("app/public.audit_logs/watermark.json").await.unwrap();
        assert_eq!(head.size, 2);

        store.delete("app/public.audit_logs/watermark.json").await.unwrap();
        assert_matches!(
            store.get("app/public.audit_logs/watermark.json").await,
            Err(ObjectStoreError::KeyNotFound { .. })
        );
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedObjectStore::new(dir.path());

        store.put("a/one.json", vec![1]).await.unwrap();
        store.put("a/b/two.json", vec![2]).await.unwrap();
        store.put("c/three.json", vec![3]).await.unwrap();

        let mut keys = store.list("a/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a/b/two.json", "a/one.json"]);
    }

    #[tokio::test]
    async fn multipart_assembles_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedObjectStore::new(dir.path());

        let upload_id = store.create_multipart("big.bin").await.unwrap();
        // Upload out of order; completion must still assemble 1, 2, 3.
        let p2 = store.put_part("big.bin", &upload_id, 2, vec![2, 2]).await.unwrap();
        let p1 = store.put_part("big.bin", &upload_id, 1, vec![1, 1]).await.unwrap();
        let p3 = store.put_part("big.bin", &upload_id, 3, vec![3]).await.unwrap();

        store
            .complete_multipart("big.bin", &upload_id, &[p2, p1, p3])
            .await
            .unwrap();
        assert_eq!(store.get("big.bin").await.unwrap(), vec![1, 1, 2, 2, 3]);
    }

    #[tokio::test]
    async fn abort_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileBackedObjectStore::new(dir.path());
        let upload_id = store.create_multipart("big.bin").await.unwrap();
        store.abort_multipart("big.bin", &upload_id).await.unwrap();
        store.abort_multipart("big.bin", &upload_id).await.unwrap();
    }
}
