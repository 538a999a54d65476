//! Document packager: collection extraction, id normalization, and
//! convention-based reference discovery.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{PackageFilter, PackageSpec};
use crate::core::{FieldValue, Record};
use crate::error::{PromoteError, Result};
use crate::package::{
    CollectionData, DocumentData, DocumentReference, IdKind, IdMapping, IdStrategy, Package,
    PackageKind, ReferenceType, DEFAULT_ID_FIELD,
};
use crate::store::DocumentStore;

/// One registered reference shape: a known field-naming convention
/// linking a source collection's field to a target collection.
#[derive(Debug, Clone)]
pub struct ReferenceRule {
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

/// Registry of known reference shapes.
///
/// Document stores have no live FK constraints, so the reference graph is
/// derived from registered conventions. This is an intentionally limited
/// heuristic: only shapes registered here are recognized, never arbitrary
/// schemas. Construct one at startup and pass it to the packager; there
/// is no process-wide registry.
#[derive(Debug, Clone, Default)]
pub struct ReferenceRegistry {
    rules: Vec<ReferenceRule>,
}

impl ReferenceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry pre-loaded with common collection conventions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (source, field, target) in [
            ("orders", "customer_id", "customers"),
            ("posts", "author_id", "users"),
            ("comments", "post_id", "posts"),
            ("comments", "author_id", "users"),
        ] {
            registry.register(ReferenceRule {
                source_collection: source.to_string(),
                source_field: field.to_string(),
                target_collection: target.to_string(),
                target_id_field: DEFAULT_ID_FIELD.to_string(),
                reference_type: ReferenceType::Single,
            });
        }
        registry.register(ReferenceRule {
            source_collection: "posts".to_string(),
            source_field: "tag_ids".to_string(),
            target_collection: "tags".to_string(),
            target_id_field: DEFAULT_ID_FIELD.to_string(),
            reference_type: ReferenceType::Array,
        });
        registry
    }

    /// Register a reference shape.
    pub fn register(&mut self, rule: ReferenceRule) {
        self.rules.push(rule);
    }

    /// All registered rules.
    pub fn rules(&self) -> &[ReferenceRule] {
        &self.rules
    }
}

/// Builds `document`-kind packages from a document store.
pub struct DocumentPackager<S> {
    store: Arc<S>,
    registry: ReferenceRegistry,
}

impl<S: DocumentStore> DocumentPackager<S> {
    /// Create a packager over the given store and reference registry.
    pub fn new(store: Arc<S>, registry: ReferenceRegistry) -> Self {
        Self { store, registry }
    }

    /// Package the requested collections.
    ///
    /// Any query failure on a requested collection aborts the whole
    /// operation; no partial package is produced.
    pub async fn package(&self, spec: &PackageSpec, filter: &PackageFilter) -> Result<Package> {
        info!(
            "Packaging {} collection(s) from {} (strip_ids: {})",
            filter.tables.len(),
            self.store.store_name(),
            filter.strip_ids
        );

        let mut data = DocumentData {
            ids_stripped: filter.strip_ids,
            store_name: self.store.store_name().to_string(),
            ..DocumentData::default()
        };

        for collection in &filter.tables {
            let query = filter
                .where_clause(collection)
                .map(parse_query)
                .transpose()?;
            let documents = self
                .store
                .find_documents(collection, query.as_ref())
                .await?;
            debug!("Collection {}: extracted {} document(s)", collection, documents.len());

            let documents: Vec<Record> = documents
                .into_iter()
                .map(|mut doc| {
                    if filter.strip_ids {
                        doc.remove(DEFAULT_ID_FIELD);
                    }
                    if let Some(excluded) = filter.excluded_columns.get(collection) {
                        for field in excluded {
                            doc.remove(field);
                        }
                    }
                    normalize_record(doc)
                })
                .collect();

            let indexes = self
                .store
                .list_indexes(collection)
                .await?
                .into_iter()
                .filter(|i| i.name != "_id_" && i.keys != [DEFAULT_ID_FIELD])
                .collect();

            data.id_mappings
                .insert(collection.clone(), id_mapping_for(&documents, filter.strip_ids));

            let document_count = documents.len() as i64;
            data.collections.push(CollectionData {
                name: collection.clone(),
                documents,
                document_count,
                id_field: DEFAULT_ID_FIELD.to_string(),
                indexes,
            });
        }

        data.references = self.build_references(&data);

        let mut package = Package::new(
            spec.name.clone(),
            spec.version.clone(),
            spec.author.clone(),
            PackageKind::Document,
        );
        package.document = Some(data);
        package.validate()?;

        info!(
            "Packaged {} collection(s) into '{}' v{}",
            package.document.as_ref().map(|d| d.collections.len()).unwrap_or(0),
            package.name,
            package.version
        );
        Ok(package)
    }

    /// Emit reference edges for registered rules whose source and target
    /// collections are both packaged.
    fn build_references(&self, data: &DocumentData) -> Vec<DocumentReference> {
        self.registry
            .rules()
            .iter()
            .filter(|rule| {
                data.contains_collection(&rule.source_collection)
                    && data.contains_collection(&rule.target_collection)
            })
            .map(|rule| DocumentReference {
                source_collection: rule.source_collection.clone(),
                source_field: rule.source_field.clone(),
                target_collection: rule.target_collection.clone(),
                target_id_field: rule.target_id_field.clone(),
                reference_type: rule.reference_type,
            })
            .collect()
    }
}

/// Parse a store-native filter query (a JSON object of field equalities)
/// into a filter record.
fn parse_query(clause: &str) -> Result<Record> {
    let value: serde_json::Value = serde_json::from_str(clause).map_err(|e| {
        PromoteError::Store(format!("invalid document filter query '{}': {}", clause, e))
    })?;
    let object = value.as_object().ok_or_else(|| {
        PromoteError::Store(format!("document filter query must be an object: '{}'", clause))
    })?;

    let mut record = Record::new();
    for (field, v) in object {
        let fv = match v {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(FieldValue::Int)
                .or_else(|| n.as_f64().map(FieldValue::Float))
                .unwrap_or(FieldValue::Null),
            serde_json::Value::String(s) => FieldValue::Text(s.clone()),
            _ => {
                return Err(PromoteError::Store(format!(
                    "document filter query supports scalar equality only: '{}'",
                    field
                )))
            }
        };
        record.set(field.clone(), fv);
    }
    Ok(record)
}

/// Normalize embedded id values to their portable string form,
/// recursively through sub-documents and arrays.
fn normalize_record(record: Record) -> Record {
    record
        .0
        .into_iter()
        .map(|(k, v)| (k, normalize_value(v)))
        .collect()
}

fn normalize_value(value: FieldValue) -> FieldValue {
    match value {
        FieldValue::Uuid(v) => FieldValue::Text(v.to_string()),
        FieldValue::Array(items) => {
            FieldValue::Array(items.into_iter().map(normalize_value).collect())
        }
        FieldValue::Document(fields) => FieldValue::Document(
            fields
                .into_iter()
                .map(|(k, v)| (k, normalize_value(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        other => other,
    }
}

/// Infer the id mapping from the extracted documents.
fn id_mapping_for(documents: &[Record], ids_stripped: bool) -> IdMapping {
    let id_kind = documents
        .iter()
        .find_map(|doc| doc.get(DEFAULT_ID_FIELD))
        .map(|id| match id {
            FieldValue::Int(_) => IdKind::Int,
            FieldValue::Uuid(_) => IdKind::Uuid,
            FieldValue::Text(s) if s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit()) => {
                IdKind::ObjectId
            }
            _ => IdKind::String,
        })
        .unwrap_or(IdKind::ObjectId);

    IdMapping {
        id_field: DEFAULT_ID_FIELD.to_string(),
        id_kind,
        strategy: if ids_stripped {
            IdStrategy::Skip
        } else {
            IdStrategy::Preserve
        },
    }
}
