use std::collections::BTreeMap;

use archiver_types::{ColumnTypeChange, ConstraintChange, SchemaDriftReport, TableSchema};

use crate::error::{ArchiverError, ErrorContext};

/// Diffs the current schema snapshot against the previous run's. With
/// `fail_on_drift`, any nonempty change list becomes a verification failure;
/// otherwise the report is recorded in the batch metadata as a warning.
pub fn compare_schemas(
    current: &TableSchema,
    previous: Option<&TableSchema>,
    fail_on_drift: bool,
) -> Result<SchemaDriftReport, ArchiverError> {
    let Some(previous) = previous else {
        tracing::info!(
            schema = %current.schema_name,
            table = %current.table_name,
            "No previous schema snapshot, first archival run"
        );
        return Ok(SchemaDriftReport::default());
    };

    let mut report = SchemaDriftReport::default();

    let current_columns: BTreeMap<&str, _> = current
        .columns
        .iter()
        .map(|col| (col.name.as_str(), col))
        .collect();
    let previous_columns: BTreeMap<&str, _> = previous
        .columns
        .iter()
        .map(|col| (col.name.as_str(), col))
        .collect();

    for name in current_columns.keys() {
        if !previous_columns.contains_key(name) {
            report.column_additions.push(name.to_string());
            report.changes.push(format!("Column added: {name}"));
        }
    }
    for name in previous_columns.keys() {
        if !current_columns.contains_key(name) {
            report.column_removals.push(name.to_string());
            report.changes.push(format!("Column removed: {name}"));
        }
    }
    for (name, current_col) in &current_columns {
        let Some(previous_col) = previous_columns.get(name) else {
            continue;
        };
        if current_col.data_type != previous_col.data_type {
            report.column_type_changes.push(ColumnTypeChange {
                column: name.to_string(),
                previous_type: previous_col.data_type.clone(),
                current_type: current_col.data_type.clone(),
            });
            report.changes.push(format!(
                "Column type changed: {name} ({} -> {})",
                previous_col.data_type, current_col.data_type
            ));
        }
        if current_col.is_nullable != previous_col.is_nullable {
            report.changes.push(format!(
                "Column nullable changed: {name} ({} -> {})",
                previous_col.is_nullable, current_col.is_nullable
            ));
        }
    }

    if current.primary_key != previous.primary_key {
        report.constraint_changes.push(ConstraintChange {
            change_type: "primary_key".to_string(),
            name: current
                .primary_key
                .as_ref()
                .or(previous.primary_key.as_ref())
                .map(|pk| pk.constraint_name.clone())
                .unwrap_or_default(),
        });
        report.changes.push(format!(
            "Primary key changed: {:?} -> {:?}",
            previous.primary_key.as_ref().map(|pk| &pk.columns),
            current.primary_key.as_ref().map(|pk| &pk.columns),
        ));
    }

    let current_fks: BTreeMap<&str, _> = current
        .foreign_keys
        .iter()
        .map(|fk| (fk.constraint_name.as_str(), fk))
        .collect();
    let previous_fks: BTreeMap<&str, _> = previous
        .foreign_keys
        .iter()
        .map(|fk| (fk.constraint_name.as_str(), fk))
        .collect();
    for name in current_fks.keys() {
        if !previous_fks.contains_key(name) {
            report.constraint_changes.push(ConstraintChange {
                change_type: "foreign_key_added".to_string(),
                name: name.to_string(),
            });
            report.changes.push(format!("Foreign key added: {name}"));
        }
    }
    for name in previous_fks.keys() {
        if !current_fks.contains_key(name) {
            report.constraint_changes.push(ConstraintChange {
                change_type: "foreign_key_removed".to_string(),
                name: name.to_string(),
            });
            report.changes.push(format!("Foreign key removed: {name}"));
        }
    }

    let current_indexes: BTreeMap<&str, _> = current
        .indexes
        .iter()
        .map(|idx| (idx.name.as_str(), idx))
        .collect();
    let previous_indexes: BTreeMap<&str, _> = previous
        .indexes
        .iter()
        .map(|idx| (idx.name.as_str(), idx))
        .collect();
    for name in current_indexes.keys() {
        if !previous_indexes.contains_key(name) {
            report.changes.push(format!("Index added: {name}"));
        }
    }
    for name in previous_indexes.keys() {
        if !current_indexes.contains_key(name) {
            report.changes.push(format!("Index removed: {name}"));
        }
    }

    report.has_drift = !report.changes.is_empty();

    if report.has_drift {
        tracing::warn!(
            schema = %current.schema_name,
            table = %current.table_name,
            change_count = report.changes.len(),
            changes = ?report.changes.iter().take(10).collect::<Vec<_>>(),
            "Schema drift detected"
        );
        if fail_on_drift {
            return Err(ArchiverError::Verification {
                message: format!("schema drift detected: {} change(s) found", report.changes.len()),
                context: ErrorContext::from([
                    ("table".to_string(), current.table_name.clone()),
                    ("changes".to_string(), report.changes.join("; ")),
                ]),
            });
        }
    }

    Ok(report)
}
