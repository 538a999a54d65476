//! In-memory store backends.
//!
//! Reference implementations of the store traits, used by the test
//! suites. They model just enough store behavior for the engine:
//! identity/sequence key assignment, equality filters, reference
//! rewriting, and bulk deletes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::{FieldValue, IndexDef, KeyValue, Record, TableSchema};
use crate::error::{PromoteError, Result};
use crate::package::{IdKind, Package, TableData, DEFAULT_ID_FIELD};

use super::traits::{DocumentStore, PackageRepository, RelationalStore, StoredPackage};

/// One in-memory table.
#[derive(Debug, Clone)]
struct MemTable {
    schema: TableSchema,
    rows: Vec<Record>,
    next_sequence: i64,
}

/// In-memory relational store.
#[derive(Debug, Default)]
pub struct MemoryRelationalStore {
    tables: Mutex<HashMap<String, MemTable>>,
    fail_sequences: AtomicBool,
}

impl MemoryRelationalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a table with the given schema.
    pub fn define_table(&self, schema: TableSchema) {
        self.lock().insert(
            schema.name.clone(),
            MemTable {
                schema,
                rows: Vec::new(),
                next_sequence: 0,
            },
        );
    }

    /// Seed rows into a table, advancing the sequence counter past any
    /// integer key values.
    pub fn seed_rows(&self, table: &str, rows: Vec<Record>) {
        let mut tables = self.lock();
        if let Some(t) = tables.get_mut(table) {
            for row in &rows {
                if let Some(pk) = t.schema.primary_key.first() {
                    if let Some(FieldValue::Int(v)) = row.get(pk) {
                        t.next_sequence = t.next_sequence.max(*v);
                    }
                }
            }
            t.rows.extend(rows);
        }
    }

    /// Snapshot the rows of a table (test inspection).
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.lock().get(table).map(|t| t.rows.clone()).unwrap_or_default()
    }

    /// Make sequence reads and updates fail, to exercise the
    /// best-effort capture and advance paths.
    pub fn fail_sequence_reads(&self, fail: bool) {
        self.fail_sequences.store(fail, Ordering::Relaxed);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemTable>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse a `column = literal` WHERE clause into a field equality check.
///
/// The in-memory backend supports only this shape; real drivers pass the
/// clause through to the store.
fn parse_where(clause: &str) -> Result<(String, FieldValue)> {
    let (column, literal) = clause.split_once('=').ok_or_else(|| {
        PromoteError::Store(format!("unsupported filter clause: '{}'", clause))
    })?;
    let column = column.trim().to_string();
    let literal = literal.trim();

    let value = if let Some(text) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        FieldValue::Text(text.to_string())
    } else if let Ok(v) = literal.parse::<i64>() {
        FieldValue::Int(v)
    } else if let Ok(v) = literal.parse::<bool>() {
        FieldValue::Bool(v)
    } else {
        return Err(PromoteError::Store(format!(
            "unsupported literal in filter clause: '{}'",
            literal
        )));
    };
    Ok((column, value))
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn introspect_table(&self, table: &str) -> Result<TableSchema> {
        self.lock()
            .get(table)
            .map(|t| t.schema.clone())
            .ok_or_else(|| PromoteError::Introspection(format!("unknown table '{}'", table)))
    }

    async fn fetch_rows(
        &self,
        table: &str,
        columns: &[String],
        where_clause: Option<&str>,
    ) -> Result<Vec<Record>> {
        let filter = where_clause.map(parse_where).transpose()?;
        let tables = self.lock();
        let t = tables
            .get(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;

        let rows = t
            .rows
            .iter()
            .filter(|row| match &filter {
                Some((column, value)) => row.get(column) == Some(value),
                None => true,
            })
            .map(|row| {
                columns
                    .iter()
                    .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
                    .collect()
            })
            .collect();
        Ok(rows)
    }

    async fn sequence_value(&self, table: &str) -> Result<Option<i64>> {
        if self.fail_sequences.load(Ordering::Relaxed) {
            return Err(PromoteError::Store("sequence read failed".to_string()));
        }
        Ok(self.lock().get(table).map(|t| t.next_sequence))
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.lock().contains_key(table))
    }

    async fn create_table(&self, table: &TableData) -> Result<()> {
        self.define_table(TableSchema {
            name: table.name.clone(),
            columns: table.columns.clone(),
            primary_key: table.primary_key.clone(),
            foreign_keys: table.foreign_keys.clone(),
        });
        Ok(())
    }

    async fn row_exists(
        &self,
        table: &str,
        key_columns: &[String],
        key: &KeyValue,
    ) -> Result<bool> {
        let tables = self.lock();
        let t = tables
            .get(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;
        Ok(t.rows
            .iter()
            .any(|row| KeyValue::from_record(row, key_columns).as_ref() == Some(key)))
    }

    async fn insert_row(&self, table: &str, row: &Record) -> Result<Option<KeyValue>> {
        let mut tables = self.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;

        let mut row = row.clone();
        let mut assigned = None;

        // A single integer key the row does not carry gets assigned from
        // the table's sequence, matching identity-column behavior.
        if let [pk] = &t.schema.primary_key[..] {
            let generated = t
                .schema
                .column(pk)
                .is_some_and(|c| c.is_identity || c.has_sequence_default());
            if generated && !row.has_value(pk) {
                t.next_sequence += 1;
                row.set(pk.clone(), FieldValue::Int(t.next_sequence));
                assigned = Some(KeyValue::Int(t.next_sequence));
            }
        }

        t.rows.push(row);
        Ok(assigned)
    }

    async fn update_row(
        &self,
        table: &str,
        key_columns: &[String],
        key: &KeyValue,
        row: &Record,
    ) -> Result<()> {
        let mut tables = self.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;

        let existing = t
            .rows
            .iter_mut()
            .find(|r| KeyValue::from_record(r, key_columns).as_ref() == Some(key))
            .ok_or_else(|| PromoteError::query(table, format!("no row with key {}", key)))?;

        for (name, value) in &row.0 {
            if !key_columns.contains(name) {
                existing.set(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    async fn rewrite_foreign_keys(
        &self,
        table: &str,
        column: &str,
        mapping: &[(FieldValue, FieldValue)],
    ) -> Result<u64> {
        let mut tables = self.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;

        let mut changed = 0;
        for row in &mut t.rows {
            // Single pass: each cell is matched against the mapping at
            // most once, so a new value never re-matches a later pair.
            let replacement = row
                .get(column)
                .and_then(|cur| mapping.iter().find(|(old, _)| old == cur))
                .map(|(_, new)| new.clone());
            if let Some(new) = replacement {
                row.set(column.to_string(), new);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn advance_sequence(&self, table: &str, value: i64) -> Result<()> {
        if self.fail_sequences.load(Ordering::Relaxed) {
            return Err(PromoteError::Store("sequence update failed".to_string()));
        }
        let mut tables = self.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;
        t.next_sequence = t.next_sequence.max(value);
        Ok(())
    }

    async fn delete_rows(
        &self,
        table: &str,
        key_columns: &[String],
        keys: &[KeyValue],
    ) -> Result<u64> {
        let mut tables = self.lock();
        let t = tables
            .get_mut(table)
            .ok_or_else(|| PromoteError::query(table, "table does not exist"))?;

        let before = t.rows.len();
        t.rows.retain(|row| {
            KeyValue::from_record(row, key_columns)
                .map(|k| !keys.contains(&k))
                .unwrap_or(true)
        });
        Ok((before - t.rows.len()) as u64)
    }

    fn dialect(&self) -> &str {
        "memory"
    }
}

/// One in-memory collection.
#[derive(Debug, Clone, Default)]
struct MemCollection {
    documents: Vec<Record>,
    indexes: Vec<IndexDef>,
}

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: Mutex<HashMap<String, MemCollection>>,
    next_int_id: AtomicI64,
}

impl MemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a collection, optionally with secondary indexes.
    pub fn define_collection(&self, name: &str, indexes: Vec<IndexDef>) {
        self.lock().insert(
            name.to_string(),
            MemCollection {
                documents: Vec::new(),
                indexes,
            },
        );
    }

    /// Seed documents into a collection.
    pub fn seed_documents(&self, collection: &str, documents: Vec<Record>) {
        if let Some(c) = self.lock().get_mut(collection) {
            c.documents.extend(documents);
        }
    }

    /// Snapshot the documents of a collection (test inspection).
    pub fn documents(&self, collection: &str) -> Vec<Record> {
        self.lock()
            .get(collection)
            .map(|c| c.documents.clone())
            .unwrap_or_default()
    }

    /// Snapshot the secondary indexes of a collection (test inspection).
    pub fn indexes(&self, collection: &str) -> Vec<IndexDef> {
        self.lock()
            .get(collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, MemCollection>> {
        self.collections.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find_documents(
        &self,
        collection: &str,
        filter: Option<&Record>,
    ) -> Result<Vec<Record>> {
        let collections = self.lock();
        let c = collections
            .get(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        Ok(c.documents
            .iter()
            .filter(|doc| match filter {
                Some(f) => f.0.iter().all(|(k, v)| doc.get(k) == Some(v)),
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDef>> {
        let collections = self.lock();
        let c = collections
            .get(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        let mut indexes = vec![IndexDef {
            name: "_id_".to_string(),
            keys: vec![DEFAULT_ID_FIELD.to_string()],
            unique: true,
        }];
        indexes.extend(c.indexes.clone());
        Ok(indexes)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.lock().contains_key(collection))
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        self.lock()
            .entry(collection.to_string())
            .or_insert_with(MemCollection::default);
        Ok(())
    }

    async fn document_exists(
        &self,
        collection: &str,
        id_field: &str,
        id: &FieldValue,
    ) -> Result<bool> {
        let collections = self.lock();
        let c = collections
            .get(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;
        Ok(c.documents.iter().any(|doc| doc.get(id_field) == Some(id)))
    }

    async fn insert_document(
        &self,
        collection: &str,
        document: &Record,
    ) -> Result<Option<FieldValue>> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        let mut document = document.clone();
        let assigned = if document.has_value(DEFAULT_ID_FIELD) {
            None
        } else {
            let id = FieldValue::Text(Uuid::new_v4().simple().to_string()[..24].to_string());
            document.set(DEFAULT_ID_FIELD, id.clone());
            Some(id)
        };

        c.documents.push(document);
        Ok(assigned)
    }

    async fn update_document(
        &self,
        collection: &str,
        id_field: &str,
        id: &FieldValue,
        document: &Record,
    ) -> Result<()> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        let existing = c
            .documents
            .iter_mut()
            .find(|doc| doc.get(id_field) == Some(id))
            .ok_or_else(|| {
                PromoteError::query(collection, format!("no document with id {}", id))
            })?;

        for (name, value) in &document.0 {
            if name != id_field {
                existing.set(name.clone(), value.clone());
            }
        }
        Ok(())
    }

    fn new_document_id(&self, kind: IdKind) -> FieldValue {
        match kind {
            IdKind::ObjectId => {
                FieldValue::Text(Uuid::new_v4().simple().to_string()[..24].to_string())
            }
            IdKind::Uuid => FieldValue::Uuid(Uuid::new_v4()),
            IdKind::String => FieldValue::Text(Uuid::new_v4().to_string()),
            IdKind::Int => FieldValue::Int(self.next_int_id.fetch_add(1, Ordering::Relaxed) + 1),
        }
    }

    async fn rewrite_references(
        &self,
        collection: &str,
        field: &str,
        mapping: &[(FieldValue, FieldValue)],
    ) -> Result<u64> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        let mut changed = 0;
        for doc in &mut c.documents {
            // Single pass, as for rewrite_foreign_keys.
            let replacement = doc
                .get(field)
                .and_then(|cur| mapping.iter().find(|(old, _)| old == cur))
                .map(|(_, new)| new.clone());
            if let Some(new) = replacement {
                doc.set(field.to_string(), new);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn rewrite_array_references(
        &self,
        collection: &str,
        field: &str,
        mapping: &[(FieldValue, FieldValue)],
    ) -> Result<u64> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        let mut changed = 0;
        for doc in &mut c.documents {
            if let Some(FieldValue::Array(items)) = doc.get(field) {
                let mut hit = false;
                let rewritten: Vec<FieldValue> = items
                    .iter()
                    .map(|item| match mapping.iter().find(|(old, _)| old == item) {
                        Some((_, new)) => {
                            hit = true;
                            new.clone()
                        }
                        None => item.clone(),
                    })
                    .collect();
                if hit {
                    doc.set(field.to_string(), FieldValue::Array(rewritten));
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn create_index(&self, collection: &str, index: &IndexDef) -> Result<()> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        c.indexes.retain(|i| i.name != index.name);
        c.indexes.push(index.clone());
        Ok(())
    }

    async fn delete_documents(
        &self,
        collection: &str,
        id_field: &str,
        ids: &[FieldValue],
    ) -> Result<u64> {
        let mut collections = self.lock();
        let c = collections
            .get_mut(collection)
            .ok_or_else(|| PromoteError::query(collection, "collection does not exist"))?;

        let before = c.documents.len();
        c.documents
            .retain(|doc| doc.get(id_field).is_none_or(|id| !ids.contains(id)));
        Ok((before - c.documents.len()) as u64)
    }

    fn store_name(&self) -> &str {
        "memory"
    }
}

/// In-memory package repository storing serialized JSON blobs.
#[derive(Debug, Default)]
pub struct MemoryPackageRepository {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryPackageRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PackageRepository for MemoryPackageRepository {
    async fn store(&self, package: &Package) -> Result<StoredPackage> {
        package.validate()?;
        let json = package.to_json()?;
        let stored = StoredPackage {
            id: package.id.clone(),
            checksum: package.checksum()?,
            size_bytes: package.size_bytes()?,
        };
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(package.id.clone(), json);
        Ok(stored)
    }

    async fn fetch(&self, id: &str) -> Result<Package> {
        let blobs = self.blobs.lock().unwrap_or_else(|e| e.into_inner());
        let json = blobs
            .get(id)
            .ok_or_else(|| PromoteError::Store(format!("no stored package with id '{}'", id)))?;
        Package::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    fn customers_schema() -> TableSchema {
        TableSchema {
            name: "customers".to_string(),
            columns: vec![
                Column {
                    name: "id".to_string(),
                    data_type: "int".to_string(),
                    max_length: 0,
                    is_nullable: false,
                    is_primary_key: true,
                    is_identity: true,
                    default_expr: None,
                    ordinal_pos: 1,
                },
                Column {
                    name: "name".to_string(),
                    data_type: "varchar".to_string(),
                    max_length: 100,
                    is_nullable: true,
                    is_primary_key: false,
                    is_identity: false,
                    default_expr: None,
                    ordinal_pos: 2,
                },
            ],
            primary_key: vec!["id".to_string()],
            foreign_keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_identity_key() {
        let store = MemoryRelationalStore::new();
        store.define_table(customers_schema());

        let assigned = store
            .insert_row("customers", &Record::new().with("name", "A"))
            .await
            .unwrap();
        assert_eq!(assigned, Some(KeyValue::Int(1)));

        let carried = store
            .insert_row(
                "customers",
                &Record::new().with("id", 50i64).with("name", "B"),
            )
            .await
            .unwrap();
        assert_eq!(carried, None);
    }

    #[tokio::test]
    async fn test_advance_sequence_is_monotonic() {
        let store = MemoryRelationalStore::new();
        store.define_table(customers_schema());

        store.advance_sequence("customers", 40).await.unwrap();
        let assigned = store
            .insert_row("customers", &Record::new().with("name", "A"))
            .await
            .unwrap();
        assert_eq!(assigned, Some(KeyValue::Int(41)));

        // Never moves backwards
        store.advance_sequence("customers", 10).await.unwrap();
        assert_eq!(store.sequence_value("customers").await.unwrap(), Some(41));
    }

    #[tokio::test]
    async fn test_fetch_rows_with_filter() {
        let store = MemoryRelationalStore::new();
        store.define_table(customers_schema());
        store.seed_rows(
            "customers",
            vec![
                Record::new().with("id", 1i64).with("name", "A"),
                Record::new().with("id", 2i64).with("name", "B"),
            ],
        );

        let cols = vec!["id".to_string(), "name".to_string()];
        let all = store.fetch_rows("customers", &cols, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = store
            .fetch_rows("customers", &cols, Some("name = 'B'"))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].get("id"), Some(&FieldValue::Int(2)));

        assert!(store
            .fetch_rows("customers", &cols, Some("name LIKE 'B%'"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_array_reference_rewrite() {
        let store = MemoryDocumentStore::new();
        store.define_collection("posts", vec![]);
        store.seed_documents(
            "posts",
            vec![Record::new().with("_id", "p1").with(
                "tag_ids",
                FieldValue::Array(vec![FieldValue::Text("t1".into()), FieldValue::Text("t2".into())]),
            )],
        );

        // t1 -> t2 and t2 -> t3 overlap; each element must follow its
        // own pair, not be rewritten twice.
        let changed = store
            .rewrite_array_references(
                "posts",
                "tag_ids",
                &[
                    (FieldValue::Text("t1".into()), FieldValue::Text("t2".into())),
                    (FieldValue::Text("t2".into()), FieldValue::Text("t3".into())),
                ],
            )
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let docs = store.documents("posts");
        assert_eq!(
            docs[0].get("tag_ids"),
            Some(&FieldValue::Array(vec![
                FieldValue::Text("t2".into()),
                FieldValue::Text("t3".into())
            ]))
        );
    }

    #[tokio::test]
    async fn test_repository_round_trip() {
        let repo = MemoryPackageRepository::new();
        let mut package =
            Package::new("p", "1.0.0", "tests", crate::package::PackageKind::Database);
        package.database = Some(Default::default());

        let stored = repo.store(&package).await.unwrap();
        assert_eq!(stored.id, package.id);
        assert_eq!(stored.checksum.len(), 64);

        let fetched = repo.fetch(&package.id).await.unwrap();
        assert_eq!(fetched, package);

        assert!(repo.fetch("missing").await.is_err());
    }
}
