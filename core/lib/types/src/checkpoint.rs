use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{
    batch::Cursor,
    value::{PkType, PkValue},
};

/// Resumable progress snapshot, written every `checkpoint.frequency` batches
/// and at run completion or failure. Serialization must be lossless: a
/// checkpoint that round-trips through its wire form seeds the next run with
/// exactly the state the previous run reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub database: String,
    #[serde(rename = "schema")]
    pub schema_name: String,
    pub table: String,
    pub batch_number: u64,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub last_primary_key: Option<JsonValue>,
    pub records_archived: u64,
    pub batches_processed: u64,
    pub checkpoint_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

impl Checkpoint {
    pub fn cursor(&self, pk_type: PkType) -> Option<Cursor> {
        let ts = self.last_timestamp?;
        let pk = PkValue::from_json(self.last_primary_key.as_ref()?, pk_type)?;
        Some(Cursor {
            last_timestamp: ts,
            last_primary_key: pk,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips_losslessly() {
        let checkpoint = Checkpoint {
            database: "app".to_string(),
            schema_name: "public".to_string(),
            table: "audit_logs".to_string(),
            batch_number: 5,
            last_timestamp: Some("2025-03-01T00:00:00Z".parse().unwrap()),
            last_primary_key: Some(JsonValue::from(12345)),
            records_archived: 5000,
            batches_processed: 5,
            checkpoint_time: Utc::now(),
            batch_id: Some("abcdef0123456789".to_string()),
        };

        let json = serde_json::to_string(&checkpoint).unwrap();
        let loaded: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, checkpoint);

        let cursor = loaded.cursor(PkType::Int8).unwrap();
        assert_eq!(cursor.last_primary_key, PkValue::Int(12345));
    }

    #[test]
    fn checkpoint_without_cursor_yields_none() {
        let checkpoint = Checkpoint {
            database: "app".to_string(),
            schema_name: "public".to_string(),
            table: "audit_logs".to_string(),
            batch_number: 0,
            last_timestamp: None,
            last_primary_key: None,
            records_archived: 0,
            batches_processed: 0,
            checkpoint_time: Utc::now(),
            batch_id: None,
        };
        assert!(checkpoint.cursor(PkType::Int8).is_none());
    }
}
