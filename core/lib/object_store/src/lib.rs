//! Object store access for the audit table archiver.
//!
//! The [`RawObjectStore`] trait abstracts the transport (S3-compatible via
//! the AWS SDK, or a directory on disk for tests and local runs). The
//! [`ArchiveStore`] client layers the archiver's operational policy on top:
//! key prefixing, bounded retries with exponential backoff, token-bucket rate
//! limiting, and journaled multipart uploads for large archives.

pub use crate::{
    client::{ArchiveStore, StoredObject},
    error::ObjectStoreError,
    file_backed::FileBackedObjectStore,
    multipart::{part_size_for, requires_multipart, MultipartUploadState, MultipartUploader},
    rate_limiter::RateLimiter,
    raw::{ObjectHead, PartEtag, RawObjectStore},
    retries::RetryPolicy,
    s3::S3Store,
};

mod client;
mod error;
mod file_backed;
mod multipart;
mod rate_limiter;
mod raw;
mod retries;
mod s3;
