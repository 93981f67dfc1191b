//! Object key layout. All keys are relative to the configured store prefix;
//! the client joins the prefix when resolving them. The layout itself is part
//! of the external contract:
//!
//! ```text
//! <db>/<schema>.<table>/year=YYYY/month=MM/day=DD/<batch_id>.jsonl.gz
//! <db>/<schema>.<table>/year=YYYY/month=MM/day=DD/<batch_id>.metadata.json
//! <db>/<schema>.<table>/year=YYYY/month=MM/day=DD/<batch_id>.manifest.json
//! <db>/<schema>.<table>/watermark.json
//! <db>/<schema>.<table>/checkpoints/<db>_<table>.checkpoint.json
//! ```

use chrono::NaiveDate;

fn table_root(database: &str, schema: &str, table: &str) -> String {
    format!("{database}/{schema}.{table}")
}

fn date_partition(date: NaiveDate) -> String {
    date.format("year=%Y/month=%m/day=%d").to_string()
}

pub fn archive_key(
    database: &str,
    schema: &str,
    table: &str,
    date: NaiveDate,
    batch_id: &str,
) -> String {
    format!(
        "{}/{}/{batch_id}.jsonl.gz",
        table_root(database, schema, table),
        date_partition(date)
    )
}

pub fn metadata_key(
    database: &str,
    schema: &str,
    table: &str,
    date: NaiveDate,
    batch_id: &str,
) -> String {
    format!(
        "{}/{}/{batch_id}.metadata.json",
        table_root(database, schema, table),
        date_partition(date)
    )
}

pub fn manifest_key(
    database: &str,
    schema: &str,
    table: &str,
    date: NaiveDate,
    batch_id: &str,
) -> String {
    format!(
        "{}/{}/{batch_id}.manifest.json",
        table_root(database, schema, table),
        date_partition(date)
    )
}

/// Latest schema snapshot, overwritten once per run after the drift check.
pub fn schema_key(database: &str, schema: &str, table: &str) -> String {
    format!("{}/schema.json", table_root(database, schema, table))
}

pub fn watermark_key(database: &str, schema: &str, table: &str) -> String {
    format!("{}/watermark.json", table_root(database, schema, table))
}

pub fn checkpoint_key(database: &str, schema: &str, table: &str) -> String {
    format!(
        "{}/checkpoints/{database}_{table}.checkpoint.json",
        table_root(database, schema, table)
    )
}

/// File name used by the local checkpoint backend.
pub fn checkpoint_file_name(database: &str, table: &str) -> String {
    format!("{database}_{table}.checkpoint.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_matches_contract() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap();
        assert_eq!(
            archive_key("app", "public", "audit_logs", date, "00112233aabbccdd"),
            "app/public.audit_logs/year=2025/month=03/day=07/00112233aabbccdd.jsonl.gz"
        );
        assert_eq!(
            metadata_key("app", "public", "audit_logs", date, "00112233aabbccdd"),
            "app/public.audit_logs/year=2025/month=03/day=07/00112233aabbccdd.metadata.json"
        );
        assert_eq!(
            watermark_key("app", "public", "audit_logs"),
            "app/public.audit_logs/watermark.json"
        );
        assert_eq!(
            checkpoint_key("app", "public", "audit_logs"),
            "app/public.audit_logs/checkpoints/app_audit_logs.checkpoint.json"
        );
    }
}
