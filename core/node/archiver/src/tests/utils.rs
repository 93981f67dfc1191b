use std::{path::Path, sync::Arc};

use archiver_object_store::{ArchiveStore, FileBackedObjectStore};
use archiver_types::{Row, RowValue};
use chrono::{DateTime, Duration, Utc};

/// An `ArchiveStore` over a temporary directory, prefixed like production.
pub(crate) fn file_store(root: &Path) -> ArchiveStore {
    ArchiveStore::new(
        Arc::new(FileBackedObjectStore::new(root)),
        "test-bucket",
        "archives",
        1000.0,
        3,
        root.join(".journal"),
    )
}

/// Rows shaped like an audit table: bigint id, timestamptz created_at, and a
/// couple of payload columns. Timestamps ascend one minute per row starting
/// `age_days` in the past.
pub(crate) fn audit_rows(count: i64, age_days: i64) -> Vec<Row> {
    let base: DateTime<Utc> = Utc::now() - Duration::days(age_days);
    (0..count)
        .map(|i| {
            Row::new(vec![
                ("id".to_string(), RowValue::Int(i + 1)),
                (
                    "created_at".to_string(),
                    RowValue::TimestampTz((base + Duration::minutes(i)).fixed_offset()),
                ),
                ("action".to_string(), RowValue::Text(format!("action-{i}"))),
                (
                    "details".to_string(),
                    RowValue::Json(serde_json::json!({ "seq": i })),
                ),
            ])
        })
        .collect()
}
