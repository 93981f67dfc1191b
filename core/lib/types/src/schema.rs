use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable-shape snapshot of a table's definition, captured once per run and
/// stored inside the first batch's metadata sidecar. The field names are part
/// of the external contract; reordering or renaming them requires a version
/// bump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    pub primary_key: Option<PrimaryKeySchema>,
    pub foreign_keys: Vec<ForeignKeySchema>,
    pub indexes: Vec<IndexSchema>,
    pub check_constraints: Vec<TableCheckConstraint>,
    pub unique_constraints: Vec<TableUniqueConstraint>,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub ordinal_position: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeySchema {
    pub constraint_name: String,
    /// Key columns in constraint order.
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySchema {
    pub constraint_name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub name: String,
    pub definition: String,
    pub is_unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCheckConstraint {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableUniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

/// Outcome of diffing the current snapshot against the previous run's.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaDriftReport {
    pub has_drift: bool,
    /// Human-readable change descriptions, one per delta.
    pub changes: Vec<String>,
    pub column_additions: Vec<String>,
    pub column_removals: Vec<String>,
    pub column_type_changes: Vec<ColumnTypeChange>,
    pub constraint_changes: Vec<ConstraintChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTypeChange {
    pub column: String,
    pub previous_type: String,
    pub current_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintChange {
    pub change_type: String,
    pub name: String,
}
