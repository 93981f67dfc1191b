//! Shared data types for the audit table archiver.
//!
//! Everything that crosses a crate boundary lives here: the dynamic row value
//! model, batch identity, schema snapshots, and the JSON wire types that form
//! the stable external contract (metadata sidecars, deletion manifests,
//! watermarks, checkpoints, lock records).

pub use crate::{
    batch::{batch_id, Cursor},
    checkpoint::Checkpoint,
    lock::LockRecord,
    metadata::{
        BatchInfo, BatchMetadata, Checksums, DataInfo, DeletionInfo, DeletionManifest,
        ManifestInfo, PrimaryKeySample, TimestampRange, WIRE_FORMAT_VERSION,
    },
    schema::{
        ColumnSchema, ColumnTypeChange, ConstraintChange, ForeignKeySchema, IndexSchema,
        PrimaryKeySchema, SchemaDriftReport, TableCheckConstraint, TableSchema,
        TableUniqueConstraint,
    },
    value::{PkType, PkValue, Row, RowValue},
    watermark::Watermark,
};

pub mod batch;
pub mod checkpoint;
pub mod keys;
pub mod lock;
pub mod metadata;
pub mod schema;
pub mod value;
pub mod watermark;
