use archiver_types::Row;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

/// Converts decoded rows into canonical JSONL.
///
/// Naive timestamps are emitted with a trailing `Z` and treated as UTC; the
/// value itself is never shifted. Every record gains four metadata fields
/// (`_archived_at`, `_batch_id`, `_source_database`, `_source_table`) on top
/// of the row's own columns.
#[derive(Debug, Default)]
pub struct RowSerializer;

impl RowSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize_row(
        &self,
        row: &Row,
        batch_id: &str,
        database_name: &str,
        table_name: &str,
        archived_at: DateTime<Utc>,
    ) -> JsonValue {
        let mut object = Map::with_capacity(row.columns.len() + 4);
        for (name, value) in &row.columns {
            object.insert(name.clone(), value.to_json());
        }
        object.insert(
            "_archived_at".to_string(),
            JsonValue::String(archived_at.to_rfc3339()),
        );
        object.insert("_batch_id".to_string(), JsonValue::String(batch_id.to_string()));
        object.insert(
            "_source_database".to_string(),
            JsonValue::String(database_name.to_string()),
        );
        object.insert(
            "_source_table".to_string(),
            JsonValue::String(table_name.to_string()),
        );
        JsonValue::Object(object)
    }

    /// One JSON object per line, `\n` separated, no trailing delimiter.
    pub fn to_jsonl(&self, records: &[JsonValue]) -> Vec<u8> {
        let mut buffer = Vec::new();
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                buffer.push(b'\n');
            }
            // Map/Vec serialization cannot fail.
            serde_json::to_writer(&mut buffer, record).expect("JSON value serialization");
        }
        buffer
    }

    /// `\n` count, plus one when the buffer is non-empty and does not end in
    /// a newline.
    pub fn count_jsonl_lines(&self, data: &[u8]) -> u64 {
        let newlines = data.iter().filter(|&&b| b == b'\n').count() as u64;
        let partial_last_line = !data.is_empty() && data.last() != Some(&b'\n');
        newlines + u64::from(partial_last_line)
    }
}

#[cfg(test)]
mod tests {
    use archiver_types::RowValue;
    use chrono::NaiveDateTime;

    use super::*;

    fn serializer() -> RowSerializer {
        RowSerializer::new()
    }

    fn archived_at() -> DateTime<Utc> {
        "2025-06-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn injects_metadata_fields_after_row_columns() {
        let row = Row::new(vec![
            ("id".to_string(), RowValue::Int(1)),
            ("action".to_string(), RowValue::Text("login".to_string())),
        ]);
        let record = serializer().serialize_row(&row, "aabbccdd00112233", "app", "audit_logs", archived_at());

        let object = record.as_object().unwrap();
        assert_eq!(object.len(), 6);
        assert_eq!(object["id"], JsonValue::from(1));
        assert_eq!(object["_batch_id"], JsonValue::from("aabbccdd00112233"));
        assert_eq!(object["_source_database"], JsonValue::from("app"));
        assert_eq!(object["_source_table"], JsonValue::from("audit_logs"));
        assert_eq!(object["_archived_at"], JsonValue::from("2025-06-01T00:00:00+00:00"));
        // Column order is preserved ahead of the injected fields.
        let keys: Vec<&String> = object.keys().collect();
        assert_eq!(keys[0], "id");
        assert_eq!(keys[1], "action");
    }

    #[test]
    fn naive_timestamps_keep_their_value_and_gain_z() {
        let ts = NaiveDateTime::parse_from_str("2025-01-15T10:30:00", "%Y-%m-%dT%H:%M:%S").unwrap();
        let row = Row::new(vec![("created_at".to_string(), RowValue::Timestamp(ts))]);
        let record = serializer().serialize_row(&row, "b", "db", "t", archived_at());
        assert_eq!(record["created_at"], JsonValue::from("2025-01-15T10:30:00Z"));
    }

    #[test]
    fn jsonl_has_no_trailing_newline() {
        let records = vec![
            serde_json::json!({"id": 1}),
            serde_json::json!({"id": 2}),
        ];
        let jsonl = serializer().to_jsonl(&records);
        assert_eq!(jsonl, b"{\"id\":1}\n{\"id\":2}");
    }

    #[test]
    fn line_count_matches_record_count() {
        let s = serializer();
        for n in [0usize, 1, 2, 100] {
            let records: Vec<JsonValue> =
                (0..n).map(|i| serde_json::json!({ "id": i })).collect();
            let jsonl = s.to_jsonl(&records);
            assert_eq!(s.count_jsonl_lines(&jsonl), n as u64);
        }
    }

    #[test]
    fn line_count_with_trailing_newline() {
        let s = serializer();
        assert_eq!(s.count_jsonl_lines(b""), 0);
        assert_eq!(s.count_jsonl_lines(b"{}"), 1);
        assert_eq!(s.count_jsonl_lines(b"{}\n"), 1);
        assert_eq!(s.count_jsonl_lines(b"{}\n{}"), 2);
        assert_eq!(s.count_jsonl_lines(b"{}\n{}\n"), 2);
    }
}
