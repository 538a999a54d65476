//! Document payload types for a package.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{IndexDef, Record};

/// Default document id field name.
pub const DEFAULT_ID_FIELD: &str = "_id";

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

/// Document payload: extracted collections plus reference metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentData {
    /// Extracted collections, in packaging order.
    pub collections: Vec<CollectionData>,

    /// Per-collection id mapping strategy, keyed by collection name.
    pub id_mappings: BTreeMap<String, IdMapping>,

    /// Reference graph across packaged collections.
    pub references: Vec<DocumentReference>,

    /// Whether id fields were stripped at packaging time.
    pub ids_stripped: bool,

    /// Source store name/dialect tag.
    pub store_name: String,
}

impl DocumentData {
    /// Find a packaged collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionData> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Check whether a collection is part of this payload.
    pub fn contains_collection(&self, name: &str) -> bool {
        self.collection(name).is_some()
    }
}

/// One extracted collection: documents plus captured index definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionData {
    /// Collection name.
    pub name: String,

    /// Extracted documents with ids in portable string form.
    pub documents: Vec<Record>,

    /// Number of extracted documents.
    pub document_count: i64,

    /// Id field name (default `_id`).
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Captured index definitions, excluding the default id index.
    pub indexes: Vec<IndexDef>,
}

/// Native id representation of a collection's id field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// Store-native object id (hex string in portable form).
    ObjectId,
    /// UUID id.
    Uuid,
    /// Plain string id.
    String,
    /// Integer id.
    Int,
}

/// Document id generation strategy applied on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Assign a fresh store-native id per document.
    Regenerate,
    /// Keep the original id, converting back to its native representation.
    Preserve,
    /// Remove the id field and let the store assign one.
    Skip,
}

/// Per-collection id mapping metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdMapping {
    /// Id field name.
    pub id_field: String,

    /// Native id representation.
    pub id_kind: IdKind,

    /// Strategy applied on replay.
    pub strategy: IdStrategy,
}

/// Shape of a cross-collection reference field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    /// Scalar reference field holding a single target id.
    Single,
    /// Array field holding multiple target ids.
    Array,
}

/// One edge of the document reference graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReference {
    /// Collection holding the reference field.
    pub source_collection: String,

    /// Reference field name.
    pub source_field: String,

    /// Referenced collection.
    pub target_collection: String,

    /// Id field of the referenced collection.
    pub target_id_field: String,

    /// Whether the field holds one id or an array of ids.
    pub reference_type: ReferenceType,
}
