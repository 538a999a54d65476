//! # data-promote
//!
//! Data package promotion engine: extract relational tables or document
//! collections into portable versioned packages, then replay them into a
//! target store.
//!
//! The engine supports:
//!
//! - **Dependency-ordered deployment** so referenced rows land before the
//!   rows that point at them
//! - **Key strategies** per table/collection (preserve, regenerate,
//!   store-assigned) with old-key/new-key mapping capture
//! - **Reference rewriting** of foreign keys and document references
//!   after keys change
//! - **Dry-run validation**, continue-on-error replay, and rollback of a
//!   recorded deployment
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use data_promote::{Config, RelationalDeployer, RelationalPackager};
//! use data_promote::store::MemoryRelationalStore;
//!
//! #[tokio::main]
//! async fn main() -> data_promote::Result<()> {
//!     let config = Config::load("promote.yaml")?;
//!     let source = Arc::new(MemoryRelationalStore::new());
//!     let target = Arc::new(MemoryRelationalStore::new());
//!
//!     let packager = RelationalPackager::new(source);
//!     let package = packager.package(&config.package, &config.filter).await?;
//!
//!     let mut deployer = RelationalDeployer::new(target);
//!     let record = deployer.deploy(&package, &config.deployment).await?;
//!     println!("Deployment finished: {:?}", record.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod deploy;
pub mod error;
pub mod package;
pub mod packager;
pub mod store;

// Re-exports for convenient access
pub use config::{Config, DeploymentOptions, PackageFilter, PackageSpec};
pub use crate::core::{FieldValue, KeyValue, Record};
pub use deploy::{
    DeploymentRecord, DeploymentStatus, DocumentDeployer, KeyPair, RelationalDeployer,
};
pub use error::{PromoteError, Result};
pub use package::{Package, PackageKind};
pub use packager::{DocumentPackager, ReferenceRegistry, RelationalPackager};
