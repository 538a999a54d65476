//! Deployment audit record: the result object produced by one deploy run.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::KeyValue;
use crate::package::Package;

/// Deployment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    InProgress,
    Validated,
    Completed,
    Failed,
    RolledBack,
}

impl DeploymentStatus {
    /// Whether this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeploymentStatus::InProgress)
    }
}

/// One old-key/new-key pair for a deployed row or document.
///
/// `new` is `None` when the target store assigned the key but did not
/// report it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Key value in the source package.
    pub old: KeyValue,

    /// Key value in the target store, if known.
    pub new: Option<KeyValue>,
}

impl KeyPair {
    /// Pair for a preserved key (old == new).
    pub fn preserved(key: KeyValue) -> Self {
        Self {
            old: key.clone(),
            new: Some(key),
        }
    }
}

/// Severity of a logged deployment issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Counts toward deployment failure.
    Error,
    /// Recorded but never fails the deploy (e.g. rewrite failures).
    Warning,
}

/// One entry in the deployment error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentIssue {
    /// Table or collection the issue occurred in.
    pub entity: String,

    /// Human-readable message.
    pub message: String,

    /// When the issue was logged.
    pub at: DateTime<Utc>,

    /// Issue severity.
    pub severity: IssueSeverity,
}

/// Audit/result object for one deploy invocation.
///
/// Created when the deploy starts, mutated in place as each table or
/// collection completes, and finalized to a terminal status before being
/// handed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    /// Unique record identifier.
    pub id: String,

    /// Source package id.
    pub package_id: String,

    /// Source package name.
    pub package_name: String,

    /// Source package version.
    pub package_version: String,

    /// Target store identifier.
    pub target: String,

    /// When the deploy started.
    pub started_at: DateTime<Utc>,

    /// When the deploy reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,

    /// Current status.
    pub status: DeploymentStatus,

    /// Per-table/per-collection old-key to new-key mapping results.
    pub key_mappings: HashMap<String, Vec<KeyPair>>,

    /// Ordered error log.
    pub error_log: Vec<DeploymentIssue>,

    /// Free-form metadata.
    pub metadata: BTreeMap<String, String>,
}

impl DeploymentRecord {
    /// Create a record for a deploy of `package` into `target`.
    pub fn new(package: &Package, target: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            package_id: package.id.clone(),
            package_name: package.name.clone(),
            package_version: package.version.clone(),
            target: target.into(),
            started_at: Utc::now(),
            completed_at: None,
            status: DeploymentStatus::InProgress,
            key_mappings: HashMap::new(),
            error_log: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Record one key mapping pair for an entity.
    pub fn record_mapping(&mut self, entity: &str, pair: KeyPair) {
        self.key_mappings.entry(entity.to_string()).or_default().push(pair);
    }

    /// Append an error entry.
    pub fn log_error(&mut self, entity: impl Into<String>, message: impl Into<String>) {
        self.error_log.push(DeploymentIssue {
            entity: entity.into(),
            message: message.into(),
            at: Utc::now(),
            severity: IssueSeverity::Error,
        });
    }

    /// Append a warning entry.
    pub fn log_warning(&mut self, entity: impl Into<String>, message: impl Into<String>) {
        self.error_log.push(DeploymentIssue {
            entity: entity.into(),
            message: message.into(),
            at: Utc::now(),
            severity: IssueSeverity::Warning,
        });
    }

    /// Error entries only (warnings excluded).
    pub fn errors(&self) -> impl Iterator<Item = &DeploymentIssue> {
        self.error_log
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    /// Whether any error-severity entry was logged.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Number of recorded mappings for an entity.
    #[must_use]
    pub fn mapping_count(&self, entity: &str) -> usize {
        self.key_mappings.get(entity).map(Vec::len).unwrap_or(0)
    }

    /// Move to a terminal status and stamp the completion time.
    pub fn finalize(&mut self, status: DeploymentStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}
