//! Schema metadata types shared by introspection and the package model.

use serde::{Deserialize, Serialize};

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Data type (e.g., "int", "varchar", "uuid").
    pub data_type: String,

    /// Maximum length for string/binary types (-1 for max).
    #[serde(default)]
    pub max_length: i32,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub is_primary_key: bool,

    /// Whether the column is an identity/auto-increment column.
    #[serde(default)]
    pub is_identity: bool,

    /// Default value expression, if any (used to detect sequence-backed keys).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expr: Option<String>,

    /// Ordinal position (1-based).
    #[serde(default)]
    pub ordinal_pos: i32,
}

impl Column {
    /// Check if the column type is a UUID/GUID type.
    #[must_use]
    pub fn is_uuid_type(&self) -> bool {
        matches!(
            self.data_type.to_lowercase().as_str(),
            "uuid" | "uniqueidentifier" | "guid"
        )
    }

    /// Check if the column default is backed by a sequence.
    #[must_use]
    pub fn has_sequence_default(&self) -> bool {
        self.default_expr
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains("nextval"))
    }
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Source column names.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced column names.
    pub ref_columns: Vec<String>,

    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: String,

    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: String,
}

/// Table schema as returned by relational introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,

    /// Column definitions.
    pub columns: Vec<Column>,

    /// Primary key column names.
    pub primary_key: Vec<String>,

    /// Foreign key constraints.
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Check if the table has a primary key.
    #[must_use]
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Find a column definition by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

/// Index metadata for a document collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,

    /// Indexed field names, in key order.
    pub keys: Vec<String>,

    /// Whether the index enforces uniqueness.
    #[serde(default)]
    pub unique: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_column(name: &str, data_type: &str) -> Column {
        Column {
            name: name.to_string(),
            data_type: data_type.to_string(),
            max_length: 0,
            is_nullable: true,
            is_primary_key: false,
            is_identity: false,
            default_expr: None,
            ordinal_pos: 1,
        }
    }

    #[test]
    fn test_is_uuid_type() {
        assert!(make_column("id", "uuid").is_uuid_type());
        assert!(make_column("id", "UNIQUEIDENTIFIER").is_uuid_type());
        assert!(!make_column("id", "varchar").is_uuid_type());
    }

    #[test]
    fn test_has_sequence_default() {
        let mut col = make_column("id", "bigint");
        assert!(!col.has_sequence_default());
        col.default_expr = Some("nextval('orders_id_seq'::regclass)".to_string());
        assert!(col.has_sequence_default());
    }

    #[test]
    fn test_schema_column_lookup() {
        let schema = TableSchema {
            name: "customers".to_string(),
            columns: vec![make_column("Id", "int"), make_column("Name", "varchar")],
            primary_key: vec!["Id".to_string()],
            foreign_keys: vec![],
        };
        assert!(schema.has_pk());
        assert!(schema.column("id").is_some());
        assert!(schema.column("missing").is_none());
    }
}
