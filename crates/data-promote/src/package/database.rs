//! Relational payload types for a package.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{Column, ForeignKey, Record};

/// Relational payload: extracted tables plus the metadata needed to
/// replay them under re-keying.
///
/// Maps are kept sorted so the serialized form, and therefore the package
/// checksum, is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseData {
    /// Extracted tables, in packaging order.
    pub tables: Vec<TableData>,

    /// Per-table primary key mapping strategy, keyed by table name.
    pub pk_mappings: BTreeMap<String, PkMapping>,

    /// Foreign key relationship graph across packaged tables.
    pub relationships: Vec<Relationship>,

    /// Last sequence value per auto-increment table, for resume on replay.
    pub sequence_info: BTreeMap<String, i64>,

    /// Source store dialect tag (e.g., "postgres", "mssql").
    pub dialect: String,
}

impl DatabaseData {
    /// Find a packaged table by name.
    pub fn table(&self, name: &str) -> Option<&TableData> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Check whether a table is part of this payload.
    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }
}

/// One extracted table: schema metadata plus an immutable row snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    /// Table name.
    pub name: String,

    /// Column definitions.
    pub columns: Vec<Column>,

    /// Primary key column names.
    pub primary_key: Vec<String>,

    /// Foreign key descriptors.
    pub foreign_keys: Vec<ForeignKey>,

    /// Extracted rows, snapshotted at packaging time.
    pub rows: Vec<Record>,

    /// Number of extracted rows.
    pub row_count: i64,
}

/// Primary key generation strategy applied on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PkStrategy {
    /// Strip the key and let the target's identity column assign one.
    AutoIncrement,
    /// Strip the key and let the target's sequence assign one.
    Sequence,
    /// Replace the key with a freshly generated UUID.
    Uuid,
    /// Keep the original key value.
    Preserve,
}

/// Per-table primary key mapping metadata.
///
/// Computed once at packaging time so the deployer never needs to
/// introspect the target store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkMapping {
    /// Columns that form the primary key.
    pub columns: Vec<String>,

    /// Whether the key is auto-increment in the source.
    pub auto_increment: bool,

    /// Strategy applied on replay.
    pub strategy: PkStrategy,
}

/// One edge of the foreign key graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Table holding the foreign key column.
    pub source_table: String,

    /// Foreign key column name.
    pub source_column: String,

    /// Referenced table.
    pub target_table: String,

    /// Referenced column name.
    pub target_column: String,

    /// Constraint name.
    pub constraint_name: String,

    /// ON DELETE action, if declared.
    #[serde(default)]
    pub on_delete: String,

    /// ON UPDATE action, if declared.
    #[serde(default)]
    pub on_update: String,
}
