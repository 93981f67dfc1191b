use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    batch::Cursor,
    value::{PkType, PkValue},
};

/// Per-table archival progress, persisted after every committed batch.
///
/// The watermark is the only overwrite-mutable object in the store; every
/// save replaces the previous one. `last_primary_key` is carried in its JSON
/// form and re-typed against the probed primary key column on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub database: String,
    pub table: String,
    pub last_timestamp: DateTime<Utc>,
    pub last_primary_key: JsonValue,
    pub updated_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(database: &str, table: &str, cursor: &Cursor, updated_at: DateTime<Utc>) -> Self {
        Self {
            database: database.to_string(),
            table: table.to_string(),
            last_timestamp: cursor.last_timestamp,
            last_primary_key: cursor.last_primary_key.to_json(),
            updated_at,
        }
    }

    /// Rebuilds the keyset cursor; `None` when the stored key does not parse
    /// under the probed primary key type.
    pub fn cursor(&self, pk_type: PkType) -> Option<Cursor> {
        PkValue::from_json(&self.last_primary_key, pk_type).map(|pk| Cursor {
            last_timestamp: self.last_timestamp,
            last_primary_key: pk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_round_trips_through_json() {
        let cursor = Cursor {
            last_timestamp: "2025-04-01T12:00:00Z".parse().unwrap(),
            last_primary_key: PkValue::Int(9000),
        };
        let watermark = Watermark::new("app", "audit_logs", &cursor, Utc::now());

        let json = serde_json::to_string(&watermark).unwrap();
        let loaded: Watermark = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded, watermark);
        assert_eq!(loaded.cursor(PkType::Int8), Some(cursor));
    }
}
