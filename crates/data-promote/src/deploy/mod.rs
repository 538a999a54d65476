//! Deployers: replay a portable [`Package`](crate::package::Package)
//! into a target store, producing a [`DeploymentRecord`] audit trail.

mod document;
mod order;
mod record;
mod relational;

pub use document::DocumentDeployer;
pub use order::{dependency_order, table_deploy_order};
pub use record::{DeploymentIssue, DeploymentRecord, DeploymentStatus, IssueSeverity, KeyPair};
pub use relational::RelationalDeployer;
