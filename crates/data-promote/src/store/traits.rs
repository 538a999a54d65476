//! Store interfaces consumed by the packagers and deployers.
//!
//! The engine never talks to a concrete database driver; it speaks to
//! these traits. Packaging issues read-only calls, deployment issues the
//! write calls, and the package repository persists serialized packages.

use async_trait::async_trait;

use crate::core::{FieldValue, IndexDef, KeyValue, Record, TableSchema};
use crate::error::Result;
use crate::package::{IdKind, Package, TableData};

/// Read/write access to a relational store.
///
/// A single deploy is expected to run inside one caller-supplied store
/// transaction, so implementations should route every call of a deploy
/// through the same connection.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    /// Introspect columns, primary key, and foreign keys from the catalog.
    async fn introspect_table(&self, table: &str) -> Result<TableSchema>;

    /// Execute a filtered SELECT over the given columns, materializing
    /// all matching rows.
    async fn fetch_rows(
        &self,
        table: &str,
        columns: &[String],
        where_clause: Option<&str>,
    ) -> Result<Vec<Record>>;

    /// Read the current sequence/identity value for a table, if it has one.
    async fn sequence_value(&self, table: &str) -> Result<Option<i64>>;

    /// Check if a table exists.
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create a table from packaged schema metadata.
    async fn create_table(&self, table: &TableData) -> Result<()>;

    /// Check if a row with the given key exists.
    async fn row_exists(&self, table: &str, key_columns: &[String], key: &KeyValue)
        -> Result<bool>;

    /// Insert a row. Returns the store-assigned key when the target
    /// generated one (identity/sequence columns), otherwise `None`.
    async fn insert_row(&self, table: &str, row: &Record) -> Result<Option<KeyValue>>;

    /// Update the non-key columns of the row identified by `key`.
    async fn update_row(
        &self,
        table: &str,
        key_columns: &[String],
        key: &KeyValue,
        row: &Record,
    ) -> Result<()>;

    /// Apply an old-to-new key mapping to a foreign key column in one
    /// operation: every row where `column` holds one of the old values
    /// gets the paired new value. Implementations must apply the whole
    /// mapping in a single pass over the current values, so a rewritten
    /// value can never be matched again by a later pair. Returns the
    /// number of rows changed.
    async fn rewrite_foreign_keys(
        &self,
        table: &str,
        column: &str,
        mapping: &[(FieldValue, FieldValue)],
    ) -> Result<u64>;

    /// Advance a table's sequence/identity counter so it is at least
    /// `value`. No-op when the counter is already past it.
    async fn advance_sequence(&self, table: &str, value: i64) -> Result<()>;

    /// Delete the rows identified by the given keys. Returns the number
    /// of rows deleted.
    async fn delete_rows(
        &self,
        table: &str,
        key_columns: &[String],
        keys: &[KeyValue],
    ) -> Result<u64>;

    /// Store dialect tag (e.g., "postgres", "mssql").
    fn dialect(&self) -> &str;
}

/// Read/write access to a document store.
///
/// Document stores have no cross-document transaction; callers bound
/// long operations with timeouts instead.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Find documents matching an optional equality filter document.
    async fn find_documents(&self, collection: &str, filter: Option<&Record>)
        -> Result<Vec<Record>>;

    /// List index definitions for a collection, including the default
    /// id index.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexDef>>;

    /// Check if a collection exists.
    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Create an empty collection.
    async fn create_collection(&self, collection: &str) -> Result<()>;

    /// Check if a document with the given id exists.
    async fn document_exists(&self, collection: &str, id_field: &str, id: &FieldValue)
        -> Result<bool>;

    /// Insert a document. Returns the store-assigned id when the store
    /// generated one, otherwise `None`.
    async fn insert_document(&self, collection: &str, document: &Record)
        -> Result<Option<FieldValue>>;

    /// Replace the non-id fields of the document identified by `id`.
    async fn update_document(
        &self,
        collection: &str,
        id_field: &str,
        id: &FieldValue,
        document: &Record,
    ) -> Result<()>;

    /// Generate a fresh store-native id of the given kind.
    fn new_document_id(&self, kind: IdKind) -> FieldValue;

    /// Apply an old-to-new id mapping to a scalar reference field in one
    /// operation: every document where `field` holds one of the old
    /// values gets the paired new value. As with
    /// [`RelationalStore::rewrite_foreign_keys`], the mapping is applied
    /// in a single pass so rewritten values cannot re-match a later
    /// pair. Returns the number of documents changed.
    async fn rewrite_references(
        &self,
        collection: &str,
        field: &str,
        mapping: &[(FieldValue, FieldValue)],
    ) -> Result<u64>;

    /// Apply an old-to-new id mapping to an array reference field:
    /// every element of the array at `field` matching an old value
    /// becomes the paired new value, in one single-pass operation.
    /// Returns the number of documents changed.
    async fn rewrite_array_references(
        &self,
        collection: &str,
        field: &str,
        mapping: &[(FieldValue, FieldValue)],
    ) -> Result<u64>;

    /// Create an index on a collection.
    async fn create_index(&self, collection: &str, index: &IndexDef) -> Result<()>;

    /// Delete all documents whose id is in `ids`, in one bulk operation.
    /// Returns the number of documents deleted.
    async fn delete_documents(
        &self,
        collection: &str,
        id_field: &str,
        ids: &[FieldValue],
    ) -> Result<u64>;

    /// Store name/dialect tag (e.g., "mongodb").
    fn store_name(&self) -> &str;
}

/// Identity of a package persisted by a [`PackageRepository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPackage {
    /// Stored record identity.
    pub id: String,

    /// SHA256 checksum of the serialized package.
    pub checksum: String,

    /// Serialized size in bytes.
    pub size_bytes: usize,
}

/// Persistence for serialized packages and their audit metadata.
///
/// The engine treats serialization as opaque JSON; implementations may
/// store the blob wherever they like.
#[async_trait]
pub trait PackageRepository: Send + Sync {
    /// Persist a package, returning its stored identity and checksum.
    async fn store(&self, package: &Package) -> Result<StoredPackage>;

    /// Retrieve a previously stored package by id.
    async fn fetch(&self, id: &str) -> Result<Package>;
}
