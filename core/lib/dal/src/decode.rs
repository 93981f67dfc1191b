use archiver_types::{Row, RowValue};
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::{postgres::PgRow, Column as _, Row as _, TypeInfo as _};
use uuid::Uuid;

/// Decodes a dynamically-typed Postgres row into ordered column/value pairs.
///
/// Types outside the supported set fall back to their string representation
/// and are logged as a warning, mirroring how unknown values are serialized
/// downstream.
pub fn decode_row(row: &PgRow) -> Row {
    let columns = row
        .columns()
        .iter()
        .map(|column| {
            let name = column.name().to_string();
            let value = decode_value(row, column.ordinal(), column.type_info().name(), &name);
            (name, value)
        })
        .collect();
    Row::new(columns)
}

fn decode_value(row: &PgRow, idx: usize, type_name: &str, column: &str) -> RowValue {
    fn prim<'r, T>(row: &'r PgRow, idx: usize) -> Result<Option<T>, sqlx::Error>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(idx)
    }

    let decoded = match type_name {
        "BOOL" => prim::<bool>(row, idx).map(|v| v.map(RowValue::Bool)),
        "INT2" => prim::<i16>(row, idx).map(|v| v.map(|i| RowValue::Int(i.into()))),
        "INT4" => prim::<i32>(row, idx).map(|v| v.map(|i| RowValue::Int(i.into()))),
        "INT8" => prim::<i64>(row, idx).map(|v| v.map(RowValue::Int)),
        "FLOAT4" => prim::<f32>(row, idx).map(|v| v.map(|f| RowValue::Float(f.into()))),
        "FLOAT8" => prim::<f64>(row, idx).map(|v| v.map(RowValue::Float)),
        "NUMERIC" => prim::<BigDecimal>(row, idx).map(|v| v.map(RowValue::Decimal)),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" | "CITEXT" => {
            prim::<String>(row, idx).map(|v| v.map(RowValue::Text))
        }
        "BYTEA" => prim::<Vec<u8>>(row, idx).map(|v| v.map(RowValue::Bytes)),
        "TIMESTAMPTZ" => prim::<DateTime<Utc>>(row, idx)
            .map(|v| v.map(|ts| RowValue::TimestampTz(ts.fixed_offset()))),
        "TIMESTAMP" => prim::<NaiveDateTime>(row, idx).map(|v| v.map(RowValue::Timestamp)),
        "DATE" => prim::<NaiveDate>(row, idx).map(|v| v.map(RowValue::Date)),
        "TIME" => prim::<NaiveTime>(row, idx).map(|v| v.map(RowValue::Time)),
        "UUID" => prim::<Uuid>(row, idx).map(|v| v.map(RowValue::Uuid)),
        "JSON" | "JSONB" => prim::<JsonValue>(row, idx).map(|v| v.map(RowValue::Json)),
        "TEXT[]" | "VARCHAR[]" => prim::<Vec<String>>(row, idx)
            .map(|v| v.map(|items| RowValue::Array(items.into_iter().map(RowValue::Text).collect()))),
        "INT4[]" => prim::<Vec<i32>>(row, idx).map(|v| {
            v.map(|items| RowValue::Array(items.into_iter().map(|i| RowValue::Int(i.into())).collect()))
        }),
        "INT8[]" => prim::<Vec<i64>>(row, idx)
            .map(|v| v.map(|items| RowValue::Array(items.into_iter().map(RowValue::Int).collect()))),
        "FLOAT8[]" => prim::<Vec<f64>>(row, idx).map(|v| {
            v.map(|items| RowValue::Array(items.into_iter().map(RowValue::Float).collect()))
        }),
        "UUID[]" => prim::<Vec<Uuid>>(row, idx)
            .map(|v| v.map(|items| RowValue::Array(items.into_iter().map(RowValue::Uuid).collect()))),
        _ => return fallback(row, idx, type_name, column),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => RowValue::Null,
        Err(_) => fallback(row, idx, type_name, column),
    }
}

fn fallback(row: &PgRow, idx: usize, type_name: &str, column: &str) -> RowValue {
    match row.try_get::<Option<String>, _>(idx) {
        Ok(Some(text)) => {
            tracing::warn!(column, type_name, "Unknown column type, converting to string");
            RowValue::Unknown(text)
        }
        Ok(None) => RowValue::Null,
        Err(err) => {
            tracing::warn!(
                column,
                type_name,
                %err,
                "Column could not be decoded, substituting null"
            );
            RowValue::Null
        }
    }
}
