use std::fmt;

use base64::Engine as _;
use bigdecimal::BigDecimal;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// A single column value decoded from the source database.
///
/// Postgres rows are dynamically typed from the archiver's point of view, so
/// values are carried as tagged variants until serialization. Naive
/// timestamps (no time zone) are kept naive here; the serializer appends a
/// trailing `Z` and treats them as UTC, it never reinterprets them in local
/// time.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision numeric, stringified on serialization to preserve
    /// precision.
    Decimal(BigDecimal),
    Text(String),
    Bytes(Vec<u8>),
    /// Timestamp with time zone; the original offset is preserved.
    TimestampTz(DateTime<FixedOffset>),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    Array(Vec<RowValue>),
    Json(JsonValue),
    /// Fallback for types the decoder does not understand; already
    /// stringified, logged as a warning at decode time.
    Unknown(String),
}

impl RowValue {
    /// Maps the value onto its canonical JSON representation.
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValue::Null => JsonValue::Null,
            RowValue::Bool(b) => JsonValue::Bool(*b),
            RowValue::Int(i) => JsonValue::from(*i),
            RowValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(f.to_string())),
            RowValue::Decimal(d) => JsonValue::String(d.to_string()),
            RowValue::Text(s) => JsonValue::String(s.clone()),
            RowValue::Bytes(b) => {
                JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
            RowValue::TimestampTz(ts) => JsonValue::String(ts.to_rfc3339()),
            // Naive values are emitted as UTC with an explicit `Z`.
            RowValue::Timestamp(ts) => {
                JsonValue::String(format!("{}Z", ts.format("%Y-%m-%dT%H:%M:%S%.f")))
            }
            RowValue::Date(d) => JsonValue::String(d.to_string()),
            RowValue::Time(t) => JsonValue::String(t.to_string()),
            RowValue::Uuid(u) => JsonValue::String(u.to_string()),
            RowValue::Array(items) => {
                JsonValue::Array(items.iter().map(RowValue::to_json).collect())
            }
            RowValue::Json(v) => v.clone(),
            RowValue::Unknown(s) => JsonValue::String(s.clone()),
        }
    }

    /// Timestamp accessor used by the cursor helpers; both zoned and naive
    /// variants normalize to UTC.
    pub fn as_utc_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            RowValue::TimestampTz(ts) => Some(ts.with_timezone(&Utc)),
            RowValue::Timestamp(ts) => Some(ts.and_utc()),
            _ => None,
        }
    }
}

/// An ordered row: column order is preserved exactly as the driver returned
/// it so the serialized object is a faithful rendition of the source row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub columns: Vec<(String, RowValue)>,
}

impl Row {
    pub fn new(columns: Vec<(String, RowValue)>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&RowValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }
}

/// Primary key column type, probed once per table from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PkType {
    Int8,
    Uuid,
    Text,
}

/// A primary key value. Restricted to the hashable types the archiver
/// supports as keyset tiebreakers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PkValue {
    Int(i64),
    Uuid(Uuid),
    Text(String),
}

impl PkValue {
    /// Extracts a primary key from a decoded row value.
    pub fn from_row_value(value: &RowValue) -> Option<Self> {
        match value {
            RowValue::Int(i) => Some(PkValue::Int(*i)),
            RowValue::Uuid(u) => Some(PkValue::Uuid(*u)),
            RowValue::Text(s) => Some(PkValue::Text(s.clone())),
            _ => None,
        }
    }

    /// Reconstructs a primary key from its JSON wire form, guided by the
    /// probed column type so a uuid-typed key round-trips as a uuid rather
    /// than an opaque string.
    pub fn from_json(value: &JsonValue, pk_type: PkType) -> Option<Self> {
        match (value, pk_type) {
            (JsonValue::Number(n), PkType::Int8) => n.as_i64().map(PkValue::Int),
            (JsonValue::String(s), PkType::Uuid) => Uuid::parse_str(s).ok().map(PkValue::Uuid),
            (JsonValue::String(s), _) => Some(PkValue::Text(s.clone())),
            (JsonValue::Number(n), _) => n.as_i64().map(PkValue::Int),
            _ => None,
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            PkValue::Int(i) => JsonValue::from(*i),
            PkValue::Uuid(u) => JsonValue::String(u.to_string()),
            PkValue::Text(s) => JsonValue::String(s.clone()),
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(i) => write!(f, "{i}"),
            PkValue::Uuid(u) => write!(f, "{u}"),
            PkValue::Text(s) => write!(f, "{s}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn naive_timestamp_gets_z_suffix() {
        let ts = NaiveDateTime::parse_from_str("2025-01-02T03:04:05", "%Y-%m-%dT%H:%M:%S").unwrap();
        let json = RowValue::Timestamp(ts).to_json();
        assert_eq!(json, JsonValue::String("2025-01-02T03:04:05Z".to_string()));
    }

    #[test]
    fn zoned_timestamp_keeps_offset() {
        let ts = DateTime::parse_from_rfc3339("2025-01-02T03:04:05+02:00").unwrap();
        let json = RowValue::TimestampTz(ts).to_json();
        assert_eq!(
            json,
            JsonValue::String("2025-01-02T03:04:05+02:00".to_string())
        );
    }

    #[test]
    fn decimal_is_stringified() {
        let d = BigDecimal::from_str("123456789.123456789").unwrap();
        assert_eq!(
            RowValue::Decimal(d).to_json(),
            JsonValue::String("123456789.123456789".to_string())
        );
    }

    #[test]
    fn bytes_are_base64() {
        assert_eq!(
            RowValue::Bytes(vec![0xde, 0xad, 0xbe, 0xef]).to_json(),
            JsonValue::String("3q2+7w==".to_string())
        );
    }

    #[test]
    fn pk_value_json_round_trip_respects_type() {
        let uuid = Uuid::parse_str("a1a2a3a4-b1b2-c1c2-d1d2-d3d4d5d6d7d8").unwrap();
        let json = PkValue::Uuid(uuid).to_json();
        assert_eq!(
            PkValue::from_json(&json, PkType::Uuid),
            Some(PkValue::Uuid(uuid))
        );
        // Without the type hint a uuid string would load as text.
        assert_eq!(
            PkValue::from_json(&json, PkType::Text),
            Some(PkValue::Text(uuid.to_string()))
        );

        let json = PkValue::Int(42).to_json();
        assert_eq!(
            PkValue::from_json(&json, PkType::Int8),
            Some(PkValue::Int(42))
        );
    }
}
