use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::schema::{SchemaDriftReport, TableSchema};

/// Schema version stamped into metadata sidecars and deletion manifests.
pub const WIRE_FORMAT_VERSION: &str = "1.0";

/// Metadata sidecar uploaded next to every archive object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub version: String,
    pub batch_info: BatchInfo,
    pub data_info: DataInfo,
    pub checksums: Checksums,
    pub primary_keys: PrimaryKeySample,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_range: Option<TimestampRange>,
    /// Present only on the first batch of a run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_schema: Option<TableSchema>,
    /// Present when drift was detected and the run is configured to warn
    /// rather than fail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_drift: Option<SchemaDriftReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub batch_number: u64,
    pub batch_id: String,
    pub archived_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub record_count: u64,
    pub uncompressed_size_bytes: u64,
    pub compressed_size_bytes: u64,
    /// Percentage saved by compression, 0 for an empty payload.
    pub compression_ratio: f64,
}

impl DataInfo {
    pub fn new(record_count: u64, uncompressed_size_bytes: u64, compressed_size_bytes: u64) -> Self {
        let compression_ratio = if uncompressed_size_bytes > 0 {
            (1.0 - compressed_size_bytes as f64 / uncompressed_size_bytes as f64) * 100.0
        } else {
            0.0
        };
        Self {
            record_count,
            uncompressed_size_bytes,
            compressed_size_bytes,
            compression_ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checksums {
    pub jsonl_sha256: String,
    pub compressed_sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeySample {
    pub count: u64,
    /// At most the first ten keys.
    pub sample: Vec<JsonValue>,
}

impl PrimaryKeySample {
    pub fn from_keys(keys: &[JsonValue]) -> Self {
        Self {
            count: keys.len() as u64,
            sample: keys.iter().take(10).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampRange {
    pub min: Option<DateTime<Utc>>,
    pub max: Option<DateTime<Utc>>,
}

/// Deletion manifest uploaded before the DELETE executes; it records the full
/// primary key list so an auditor can reconcile the archive against the
/// source without replaying the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionManifest {
    pub version: String,
    pub manifest_info: ManifestInfo,
    pub deletion_info: DeletionInfo,
    pub primary_keys: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestInfo {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub batch_number: u64,
    pub batch_id: String,
    pub primary_key_column: String,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeletionInfo {
    pub expected_count: u64,
    pub deleted_count: u64,
    pub primary_keys_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl DeletionManifest {
    pub fn new(
        manifest_info: ManifestInfo,
        primary_keys: Vec<JsonValue>,
        deleted_count: u64,
    ) -> Self {
        let expected_count = primary_keys.len() as u64;
        let warning = (deleted_count != expected_count).then(|| {
            format!(
                "Deleted count ({deleted_count}) does not match primary keys count ({expected_count})"
            )
        });
        Self {
            version: WIRE_FORMAT_VERSION.to_string(),
            manifest_info,
            deletion_info: DeletionInfo {
                expected_count,
                deleted_count,
                primary_keys_count: expected_count,
                warning,
            },
            primary_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_ratio_handles_empty_payload() {
        let info = DataInfo::new(0, 0, 0);
        assert_eq!(info.compression_ratio, 0.0);

        let info = DataInfo::new(10, 1000, 250);
        assert!((info.compression_ratio - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pk_sample_is_capped_at_ten() {
        let keys: Vec<JsonValue> = (0..25).map(JsonValue::from).collect();
        let sample = PrimaryKeySample::from_keys(&keys);
        assert_eq!(sample.count, 25);
        assert_eq!(sample.sample.len(), 10);
        assert_eq!(sample.sample[9], JsonValue::from(9));
    }

    #[test]
    fn manifest_warns_on_count_mismatch() {
        let info = ManifestInfo {
            database: "app".to_string(),
            schema: "public".to_string(),
            table: "audit_logs".to_string(),
            batch_number: 1,
            batch_id: "0011223344556677".to_string(),
            primary_key_column: "id".to_string(),
            deleted_at: Utc::now(),
        };
        let keys: Vec<JsonValue> = (0..3).map(JsonValue::from).collect();

        let ok = DeletionManifest::new(info.clone(), keys.clone(), 3);
        assert!(ok.deletion_info.warning.is_none());

        let short = DeletionManifest::new(info, keys, 2);
        assert!(short.deletion_info.warning.is_some());
    }
}
