//! Document deployer: collection-by-collection replay of a document
//! package with per-collection id strategies and reference rewriting.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::DeploymentOptions;
use crate::core::{FieldValue, KeyValue, Record};
use crate::error::{PromoteError, Result};
use crate::package::{
    CollectionData, DocumentData, IdKind, IdMapping, IdStrategy, Package, ReferenceType,
    DEFAULT_ID_FIELD,
};
use crate::store::DocumentStore;

use super::record::{DeploymentRecord, DeploymentStatus, KeyPair};

/// Default per-operation timeout for document store calls.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Record metadata key holding a collection's non-default id field name.
fn id_field_meta_key(collection: &str) -> String {
    format!("id_field.{}", collection)
}

/// Reject reference field names that cannot be safely interpolated into
/// a store update: empty names, operator-prefixed names, path
/// expressions, and names with control characters.
fn validate_field_name(field: &str) -> Result<()> {
    if field.is_empty()
        || field.starts_with('$')
        || field.contains('.')
        || field.chars().any(char::is_control)
    {
        return Err(PromoteError::UnsafeFieldName(field.to_string()));
    }
    Ok(())
}

/// Replays a `document`-kind package into a document store.
///
/// Document stores offer no cross-document transaction, so every store
/// call is bounded by a per-operation timeout instead. Like the
/// relational deployer, an instance is single-use.
pub struct DocumentDeployer<S> {
    store: Arc<S>,
    id_mappings: HashMap<String, Vec<KeyPair>>,
    op_timeout: Duration,
    spent: bool,
}

impl<S: DocumentStore> DocumentDeployer<S> {
    /// Create a deployer over the given target store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            id_mappings: HashMap::new(),
            op_timeout: DEFAULT_OP_TIMEOUT,
            spent: false,
        }
    }

    /// Override the per-operation timeout.
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Deploy a package.
    ///
    /// Collections are replayed in package order. Structural problems
    /// return an error directly; store-side failures are reported through
    /// the returned record.
    pub async fn deploy(
        &mut self,
        package: &Package,
        options: &DeploymentOptions,
    ) -> Result<DeploymentRecord> {
        if self.spent {
            return Err(PromoteError::Config(
                "deployer instances are single-use; construct a fresh one per deploy".to_string(),
            ));
        }
        self.spent = true;
        options.validate()?;
        package.validate()?;
        let data = package
            .document
            .as_ref()
            .ok_or_else(|| PromoteError::Package("package has no document payload".to_string()))?;

        let mut record = DeploymentRecord::new(package, self.store.store_name());
        record.metadata.extend(options.metadata.clone());

        if options.dry_run {
            return Ok(self.dry_run(data, options, record));
        }

        info!(
            "Deploying package '{}' v{} ({} collections) to {}",
            package.name,
            package.version,
            data.collections.len(),
            self.store.store_name()
        );

        for collection in &data.collections {
            let mapping = data.id_mappings.get(&collection.name);
            if collection.id_field != DEFAULT_ID_FIELD {
                record.metadata.insert(
                    id_field_meta_key(&collection.name),
                    collection.id_field.clone(),
                );
            }

            match self
                .deploy_collection(collection, mapping, options, &mut record)
                .await
            {
                Ok(()) => {
                    debug!(
                        "Collection {}: {} mapping(s) recorded",
                        collection.name,
                        self.id_mappings.get(&collection.name).map(Vec::len).unwrap_or(0)
                    );
                }
                Err(e) => {
                    record.log_error(&collection.name, e.to_string());
                    if !options.continue_on_error {
                        self.publish_mappings(&mut record);
                        record.finalize(DeploymentStatus::Failed);
                        return Ok(record);
                    }
                }
            }
        }

        self.rewrite_references(data, &mut record).await;

        if options.rebuild_indexes {
            if let Err(e) = self.rebuild_indexes(data, options, &mut record).await {
                record.log_error("deployment", e.to_string());
                self.publish_mappings(&mut record);
                record.finalize(DeploymentStatus::Failed);
                return Ok(record);
            }
        }

        self.publish_mappings(&mut record);
        let status = if record.has_errors() {
            DeploymentStatus::Failed
        } else {
            DeploymentStatus::Completed
        };
        record.finalize(status);
        info!(
            "Deploy of '{}' finished with status {:?}",
            package.name, record.status
        );
        Ok(record)
    }

    /// Delete everything a deploy wrote.
    ///
    /// Documents are identified by the new-id side of the record's
    /// mappings and removed with one bulk delete per collection. Returns
    /// the per-collection delete counts.
    pub async fn rollback(&self, record: &mut DeploymentRecord) -> Result<HashMap<String, u64>> {
        let mut deleted = HashMap::new();

        for (collection, pairs) in &record.key_mappings {
            let ids: Vec<FieldValue> = pairs
                .iter()
                .filter_map(|p| p.new.as_ref().and_then(KeyValue::to_field))
                .collect();
            if ids.is_empty() {
                continue;
            }
            let id_field = record
                .metadata
                .get(&id_field_meta_key(collection))
                .map(String::as_str)
                .unwrap_or(DEFAULT_ID_FIELD);

            let count = self
                .bounded(
                    "delete_documents",
                    self.store.delete_documents(collection, id_field, &ids),
                )
                .await?;
            info!("Rollback: deleted {} document(s) from {}", count, collection);
            deleted.insert(collection.clone(), count);
        }

        record.finalize(DeploymentStatus::RolledBack);
        Ok(deleted)
    }

    /// Structural validation without touching the target store.
    fn dry_run(
        &self,
        data: &DocumentData,
        options: &DeploymentOptions,
        mut record: DeploymentRecord,
    ) -> DeploymentRecord {
        info!("Dry run: validating package structure");

        for collection in &data.collections {
            if collection.name.is_empty() {
                record.log_error("deployment", "package contains a collection with an empty name");
            }
            if collection.id_field.is_empty() {
                record.log_error(&collection.name, "collection has an empty id field name");
            }
        }

        if options.validate_references {
            for reference in &data.references {
                if !data.contains_collection(&reference.source_collection) {
                    record.log_error(
                        &reference.source_collection,
                        format!(
                            "reference field {} lives in a collection missing from package",
                            reference.source_field
                        ),
                    );
                }
                if !data.contains_collection(&reference.target_collection) {
                    record.log_error(
                        &reference.target_collection,
                        format!(
                            "reference field {} targets a collection missing from package",
                            reference.source_field
                        ),
                    );
                }
                if let Err(e) = validate_field_name(&reference.source_field) {
                    record.log_error(&reference.source_collection, e.to_string());
                }
            }
        }

        let status = if record.has_errors() {
            DeploymentStatus::Failed
        } else {
            DeploymentStatus::Validated
        };
        record.finalize(status);
        record
    }

    /// Deploy one collection's documents in fixed-size batches.
    async fn deploy_collection(
        &mut self,
        collection: &CollectionData,
        mapping: Option<&IdMapping>,
        options: &DeploymentOptions,
        record: &mut DeploymentRecord,
    ) -> Result<()> {
        if !self
            .bounded(
                "collection_exists",
                self.store.collection_exists(&collection.name),
            )
            .await?
        {
            if options.create_missing {
                info!("Creating missing target collection {}", collection.name);
                self.bounded(
                    "create_collection",
                    self.store.create_collection(&collection.name),
                )
                .await?;
            } else {
                return Err(PromoteError::deploy(
                    &collection.name,
                    "collection does not exist in target and create_missing is not set",
                ));
            }
        }

        // Packages written before id mapping capture carry no entry;
        // fall back to preserving whatever ids the documents hold.
        let fallback = IdMapping {
            id_field: collection.id_field.clone(),
            id_kind: IdKind::String,
            strategy: IdStrategy::Preserve,
        };
        let mapping = mapping.unwrap_or(&fallback);

        for batch in collection.documents.chunks(options.batch_size) {
            for document in batch {
                match self
                    .deploy_document(&collection.name, document, mapping, options)
                    .await
                {
                    Ok(Some(pair)) => {
                        self.id_mappings
                            .entry(collection.name.clone())
                            .or_default()
                            .push(pair);
                    }
                    Ok(None) => {}
                    Err(e) if options.continue_on_error => {
                        record.log_error(&collection.name, e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
            debug!(
                "Collection {}: batch of {} document(s) processed",
                collection.name,
                batch.len()
            );
        }
        Ok(())
    }

    /// Deploy one document, applying the collection's id strategy and the
    /// existing-document policy.
    async fn deploy_document(
        &self,
        collection: &str,
        document: &Record,
        mapping: &IdMapping,
        options: &DeploymentOptions,
    ) -> Result<Option<KeyPair>> {
        let id_field = mapping.id_field.as_str();
        let old_id = document.get(id_field).cloned();
        let old_key = old_id.as_ref().and_then(KeyValue::from_field);

        match mapping.strategy {
            IdStrategy::Regenerate => {
                let new_id = self.store.new_document_id(mapping.id_kind);
                let mut insert = document.clone();
                insert.set(id_field.to_string(), new_id.clone());
                self.bounded("insert_document", self.store.insert_document(collection, &insert))
                    .await?;
                Ok(old_key.map(|old| KeyPair {
                    old,
                    new: KeyValue::from_field(&new_id),
                }))
            }
            IdStrategy::Skip => {
                let mut insert = document.clone();
                insert.remove(id_field);
                let assigned = self
                    .bounded("insert_document", self.store.insert_document(collection, &insert))
                    .await?;
                Ok(old_key.map(|old| KeyPair {
                    old,
                    new: assigned.as_ref().and_then(KeyValue::from_field),
                }))
            }
            IdStrategy::Preserve => {
                let Some(old_id) = old_id else {
                    // No id to preserve: plain insert, nothing to map.
                    self.bounded("insert_document", self.store.insert_document(collection, document))
                        .await?;
                    return Ok(None);
                };
                let native = native_id(mapping.id_kind, &old_id)?;
                let mut insert = document.clone();
                insert.set(id_field.to_string(), native.clone());
                let pair = KeyPair {
                    old: old_key.ok_or_else(|| {
                        PromoteError::deploy(collection, format!("unusable id value: {}", old_id))
                    })?,
                    new: KeyValue::from_field(&native),
                };

                if self
                    .bounded(
                        "document_exists",
                        self.store.document_exists(collection, id_field, &native),
                    )
                    .await?
                {
                    if options.skip_existing {
                        return Ok(Some(pair));
                    }
                    if options.update_existing {
                        self.bounded(
                            "update_document",
                            self.store.update_document(collection, id_field, &native, &insert),
                        )
                        .await?;
                        return Ok(Some(pair));
                    }
                    return Err(PromoteError::conflict(collection, native.to_portable_string()));
                }

                self.bounded("insert_document", self.store.insert_document(collection, &insert))
                    .await?;
                Ok(Some(pair))
            }
        }
    }

    /// Rewrite reference fields using the recorded id mappings.
    ///
    /// Only references whose source and target collections both produced
    /// mappings are touched; failures log warnings and never abort.
    async fn rewrite_references(&self, data: &DocumentData, record: &mut DeploymentRecord) {
        for reference in &data.references {
            if !self.id_mappings.contains_key(&reference.source_collection) {
                continue;
            }
            let Some(target_pairs) = self.id_mappings.get(&reference.target_collection) else {
                continue;
            };
            if let Err(e) = validate_field_name(&reference.source_field) {
                warn!(
                    "Skipping reference rewrite in {}: {}",
                    reference.source_collection, e
                );
                record.log_warning(&reference.source_collection, e.to_string());
                continue;
            }

            // The whole old-to-new map goes to the store in one call, as
            // in the relational deployer: pair-at-a-time rewriting would
            // re-match already-rewritten ids when the old and new id
            // spaces overlap (easily hit with regenerated integer ids).
            let mapping: Vec<(FieldValue, FieldValue)> = target_pairs
                .iter()
                .filter_map(|pair| {
                    let new = pair.new.as_ref()?;
                    if *new == pair.old {
                        return None;
                    }
                    Some((pair.old.to_field()?, new.to_field()?))
                })
                .collect();
            if mapping.is_empty() {
                continue;
            }

            let result = match reference.reference_type {
                ReferenceType::Single => {
                    self.bounded(
                        "rewrite_references",
                        self.store.rewrite_references(
                            &reference.source_collection,
                            &reference.source_field,
                            &mapping,
                        ),
                    )
                    .await
                }
                ReferenceType::Array => {
                    self.bounded(
                        "rewrite_array_references",
                        self.store.rewrite_array_references(
                            &reference.source_collection,
                            &reference.source_field,
                            &mapping,
                        ),
                    )
                    .await
                }
            };

            match result {
                Ok(changed) if changed > 0 => {
                    debug!(
                        "Rewrote {}.{}: {} document(s) across {} id pair(s)",
                        reference.source_collection,
                        reference.source_field,
                        changed,
                        mapping.len()
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "Reference rewrite failed for {}.{}: {}",
                        reference.source_collection, reference.source_field, e
                    );
                    record.log_warning(
                        &reference.source_collection,
                        format!("reference rewrite failed on {}: {}", reference.source_field, e),
                    );
                }
            }
        }
    }

    /// Recreate packaged secondary indexes on the target collections.
    async fn rebuild_indexes(
        &self,
        data: &DocumentData,
        options: &DeploymentOptions,
        record: &mut DeploymentRecord,
    ) -> Result<()> {
        for collection in &data.collections {
            for index in &collection.indexes {
                match self
                    .bounded("create_index", self.store.create_index(&collection.name, index))
                    .await
                {
                    Ok(()) => debug!("Created index {} on {}", index.name, collection.name),
                    Err(e) if options.continue_on_error => {
                        record.log_error(
                            &collection.name,
                            format!("index {} rebuild failed: {}", index.name, e),
                        );
                    }
                    Err(e) => {
                        return Err(PromoteError::deploy(
                            &collection.name,
                            format!("index {} rebuild failed: {}", index.name, e),
                        ))
                    }
                }
            }
        }
        Ok(())
    }

    /// Bound a store call with the per-operation timeout.
    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(PromoteError::Timeout {
                operation: operation.to_string(),
                seconds: self.op_timeout.as_secs(),
            }),
        }
    }

    /// Copy the accumulated mappings onto the record.
    fn publish_mappings(&self, record: &mut DeploymentRecord) {
        for (collection, pairs) in &self.id_mappings {
            record
                .key_mappings
                .entry(collection.clone())
                .or_default()
                .extend(pairs.iter().cloned());
        }
    }
}

/// Convert a portable id value back to its store-native representation.
fn native_id(kind: IdKind, value: &FieldValue) -> Result<FieldValue> {
    let FieldValue::Text(text) = value else {
        // Already native (ids packaged by older tooling).
        return Ok(value.clone());
    };
    match kind {
        IdKind::Uuid => {
            let parsed = Uuid::parse_str(text).map_err(|e| {
                PromoteError::Package(format!("invalid UUID id '{}': {}", text, e))
            })?;
            Ok(FieldValue::Uuid(parsed))
        }
        IdKind::Int => {
            let parsed: i64 = text.parse().map_err(|e| {
                PromoteError::Package(format!("invalid integer id '{}': {}", text, e))
            })?;
            Ok(FieldValue::Int(parsed))
        }
        IdKind::ObjectId | IdKind::String => Ok(FieldValue::Text(text.clone())),
    }
}
