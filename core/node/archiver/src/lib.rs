//! The archival pipeline: serialization, compression, integrity
//! verification, sampling, watermark/checkpoint persistence, distributed
//! locking, and the per-table orchestration that ties them together.
//!
//! A table run is a state machine (lock → schema capture → checkpoint load →
//! batch loop), and every batch moves through select → serialize → compress →
//! upload → verify → delete → watermark in that order. Rows are only deleted
//! once their archive object has been re-read and checksum-verified.

pub use crate::{
    checkpoint::CheckpointStore,
    checksum::{checksums_match, sha256_hex},
    compressor::Compressor,
    drift::compare_schemas,
    error::{ArchiverError, ErrorContext},
    locking::{HeldLock, LockGuard, LockManager},
    orchestrator::Archiver,
    sample::SampleVerifier,
    serializer::RowSerializer,
    stats::{RunStats, TableStats},
    table_archiver::TableArchiver,
    verifier::Verifier,
    watermark::WatermarkStore,
};

mod checkpoint;
mod checksum;
mod compressor;
mod drift;
mod error;
mod locking;
mod metrics;
mod orchestrator;
mod sample;
mod serializer;
mod stats;
mod table_archiver;
#[cfg(test)]
mod tests;
mod verifier;
mod watermark;
