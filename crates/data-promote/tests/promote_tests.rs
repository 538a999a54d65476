//! End-to-end promotion tests for data-promote.
//!
//! These tests run the full pipeline against the in-memory reference
//! stores: package from a seeded source, persist and re-fetch the
//! package, deploy it into a target, and roll the deployment back.

use std::sync::Arc;

use data_promote::core::{Column, FieldValue, ForeignKey, Record, TableSchema};
use data_promote::package::{IdStrategy, PkStrategy, DEFAULT_ID_FIELD};
use data_promote::store::{
    MemoryDocumentStore, MemoryPackageRepository, MemoryRelationalStore, PackageRepository,
    RelationalStore,
};
use data_promote::{
    Config, DeploymentStatus, DocumentDeployer, DocumentPackager, RelationalDeployer,
    RelationalPackager,
};
use data_promote::packager::ReferenceRegistry;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Relational pipeline
// =============================================================================

fn column(name: &str, data_type: &str) -> Column {
    Column {
        name: name.to_string(),
        data_type: data_type.to_string(),
        max_length: 0,
        is_nullable: true,
        is_primary_key: false,
        is_identity: false,
        default_expr: None,
        ordinal_pos: 0,
    }
}

fn identity_column(name: &str) -> Column {
    Column {
        is_identity: true,
        is_nullable: false,
        ..column(name, "int")
    }
}

fn customers_schema() -> TableSchema {
    TableSchema {
        name: "customers".to_string(),
        columns: vec![identity_column("id"), column("name", "varchar")],
        primary_key: vec!["id".to_string()],
        foreign_keys: vec![],
    }
}

/// Source with customers and orders referencing them.
fn seeded_source() -> Arc<MemoryRelationalStore> {
    let store = MemoryRelationalStore::new();

    store.define_table(customers_schema());
    store.seed_rows(
        "customers",
        vec![
            Record::new().with("id", 1i64).with("name", "A"),
            Record::new().with("id", 2i64).with("name", "B"),
        ],
    );

    store.define_table(TableSchema {
        name: "orders".to_string(),
        columns: vec![identity_column("id"), column("customer_id", "int")],
        primary_key: vec!["id".to_string()],
        foreign_keys: vec![ForeignKey {
            name: "fk_orders_customer".to_string(),
            columns: vec!["customer_id".to_string()],
            ref_table: "customers".to_string(),
            ref_columns: vec!["id".to_string()],
            on_delete: String::new(),
            on_update: String::new(),
        }],
    });
    store.seed_rows(
        "orders",
        vec![
            Record::new().with("id", 10i64).with("customer_id", 1i64),
            Record::new().with("id", 11i64).with("customer_id", 2i64),
        ],
    );

    Arc::new(store)
}

const RELATIONAL_CONFIG: &str = r#"
package:
  name: shop-snapshot
  version: 1.0.0
  author: integration-tests
filter:
  tables: [orders]
  include_related: true
deployment:
  create_missing: true
"#;

#[tokio::test]
async fn test_relational_promotion_end_to_end() {
    init_tracing();
    let config = Config::from_yaml(RELATIONAL_CONFIG).unwrap();

    // Package orders plus the customers they reference.
    let packager = RelationalPackager::new(seeded_source());
    let package = packager
        .package(&config.package, &config.filter)
        .await
        .unwrap();
    let data = package.database.as_ref().unwrap();
    assert_eq!(data.tables.len(), 2);
    assert_eq!(data.relationships.len(), 1);
    assert_eq!(data.pk_mappings["customers"].strategy, PkStrategy::AutoIncrement);

    // Persist, then deploy the re-fetched copy.
    let repo = MemoryPackageRepository::new();
    let stored = repo.store(&package).await.unwrap();
    let fetched = repo.fetch(&stored.id).await.unwrap();
    assert_eq!(fetched.checksum().unwrap(), stored.checksum);

    // The target already holds unrelated customers, so the identity
    // sequence is past the packaged ids.
    let target = Arc::new(MemoryRelationalStore::new());
    target.define_table(customers_schema());
    target.seed_rows(
        "customers",
        vec![
            Record::new().with("id", 1i64).with("name", "existing-1"),
            Record::new().with("id", 2i64).with("name", "existing-2"),
            Record::new().with("id", 3i64).with("name", "existing-3"),
        ],
    );

    let mut deployer = RelationalDeployer::new(target.clone());
    let record = deployer.deploy(&fetched, &config.deployment).await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Completed);

    // Packaged customers landed under fresh ids 4 and 5.
    let new_ids: Vec<FieldValue> = record.key_mappings["customers"]
        .iter()
        .map(|p| p.new.as_ref().unwrap().to_field().unwrap())
        .collect();
    assert_eq!(new_ids, vec![FieldValue::Int(4), FieldValue::Int(5)]);
    assert_eq!(target.rows("customers").len(), 5);

    // Every deployed order now points at one of the fresh customer ids.
    let orders = target.rows("orders");
    assert_eq!(orders.len(), 2);
    for order in &orders {
        assert!(new_ids.contains(order.get("customer_id").unwrap()));
    }

    // Rollback removes exactly what the deploy wrote.
    let mut record = record;
    deployer.rollback(&fetched, &mut record).await.unwrap();
    assert_eq!(record.status, DeploymentStatus::RolledBack);
    assert_eq!(target.rows("customers").len(), 3);
    assert!(target.rows("orders").is_empty());
}

#[tokio::test]
async fn test_relational_dry_run_touches_nothing() {
    init_tracing();
    let mut config = Config::from_yaml(RELATIONAL_CONFIG).unwrap();
    config.deployment.dry_run = true;
    config.deployment.validate_references = true;

    let packager = RelationalPackager::new(seeded_source());
    let package = packager
        .package(&config.package, &config.filter)
        .await
        .unwrap();

    let target = Arc::new(MemoryRelationalStore::new());
    let mut deployer = RelationalDeployer::new(target.clone());
    let record = deployer.deploy(&package, &config.deployment).await.unwrap();

    assert_eq!(record.status, DeploymentStatus::Validated);
    assert!(!target.table_exists("customers").await.unwrap());
    assert!(!target.table_exists("orders").await.unwrap());
}

// =============================================================================
// Document pipeline
// =============================================================================

/// Source with users and posts referencing them by author_id.
fn seeded_document_source() -> Arc<MemoryDocumentStore> {
    let store = MemoryDocumentStore::new();

    store.define_collection("users", vec![]);
    store.seed_documents(
        "users",
        vec![
            Record::new()
                .with(DEFAULT_ID_FIELD, FieldValue::Text("u1".into()))
                .with("name", FieldValue::Text("alice".into())),
            Record::new()
                .with(DEFAULT_ID_FIELD, FieldValue::Text("u2".into()))
                .with("name", FieldValue::Text("bob".into())),
        ],
    );

    store.define_collection("posts", vec![]);
    store.seed_documents(
        "posts",
        vec![Record::new()
            .with(DEFAULT_ID_FIELD, FieldValue::Text("p1".into()))
            .with("author_id", FieldValue::Text("u1".into()))],
    );

    Arc::new(store)
}

const DOCUMENT_CONFIG: &str = r#"
package:
  name: blog-snapshot
  version: 2.0.0
  author: integration-tests
filter:
  tables: [users, posts]
deployment:
  create_missing: true
"#;

#[tokio::test]
async fn test_document_promotion_end_to_end() {
    init_tracing();
    let config = Config::from_yaml(DOCUMENT_CONFIG).unwrap();

    let packager =
        DocumentPackager::new(seeded_document_source(), ReferenceRegistry::with_builtins());
    let mut package = packager
        .package(&config.package, &config.filter)
        .await
        .unwrap();

    // The registry linked posts.author_id to users.
    let data = package.document.as_mut().unwrap();
    assert_eq!(data.references.len(), 1);

    // Promote users under fresh ids; posts keep theirs.
    data.id_mappings.get_mut("users").unwrap().strategy = IdStrategy::Regenerate;

    let target = Arc::new(MemoryDocumentStore::new());
    let mut deployer = DocumentDeployer::new(target.clone());
    let record = deployer.deploy(&package, &config.deployment).await.unwrap();
    assert_eq!(record.status, DeploymentStatus::Completed);

    let user_ids: Vec<FieldValue> = target
        .documents("users")
        .iter()
        .map(|d| d.get(DEFAULT_ID_FIELD).cloned().unwrap())
        .collect();
    assert_eq!(user_ids.len(), 2);
    assert!(!user_ids.contains(&FieldValue::Text("u1".into())));

    // The post follows its author's regenerated id.
    let posts = target.documents("posts");
    assert!(user_ids.contains(posts[0].get("author_id").unwrap()));

    // Rollback clears both collections.
    let mut record = record;
    let deleted = deployer.rollback(&mut record).await.unwrap();
    assert_eq!(deleted.get("users"), Some(&2));
    assert_eq!(deleted.get("posts"), Some(&1));
    assert!(target.documents("users").is_empty());
    assert!(target.documents("posts").is_empty());
}

#[tokio::test]
async fn test_document_skip_existing_is_idempotent() {
    init_tracing();
    let mut config = Config::from_yaml(DOCUMENT_CONFIG).unwrap();
    config.deployment.skip_existing = true;

    let packager =
        DocumentPackager::new(seeded_document_source(), ReferenceRegistry::with_builtins());
    let package = packager
        .package(&config.package, &config.filter)
        .await
        .unwrap();

    let target = Arc::new(MemoryDocumentStore::new());
    for _ in 0..2 {
        let mut deployer = DocumentDeployer::new(target.clone());
        let record = deployer.deploy(&package, &config.deployment).await.unwrap();
        assert_eq!(record.status, DeploymentStatus::Completed);
    }

    assert_eq!(target.documents("users").len(), 2);
    assert_eq!(target.documents("posts").len(), 1);
}
