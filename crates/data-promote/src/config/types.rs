//! Configuration type definitions: the two caller-facing request shapes
//! plus the package identity they are wrapped with.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Default deployment batch size.
pub const DEFAULT_BATCH_SIZE: usize = 100;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity of the package to build.
    pub package: PackageSpec,

    /// What to extract from the source store.
    pub filter: PackageFilter,

    /// How to replay the package into the target store.
    #[serde(default)]
    pub deployment: DeploymentOptions,
}

/// Identity of the package being built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Package name.
    pub name: String,

    /// Semantic version string.
    pub version: String,

    /// Package author.
    #[serde(default)]
    pub author: String,
}

/// Selection filter for packaging.
///
/// Used for both relational tables and document collections; `tables`
/// names the requested entities either way, and `where_clauses` carries
/// per-entity WHERE clauses (relational) or store-native filter queries
/// (document).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageFilter {
    /// Requested table/collection names.
    pub tables: Vec<String>,

    /// Per-entity filter clause.
    #[serde(default)]
    pub where_clauses: HashMap<String, String>,

    /// Per-entity columns/fields to exclude from extraction.
    #[serde(default)]
    pub excluded_columns: HashMap<String, Vec<String>>,

    /// Follow foreign keys to related tables (relational only).
    #[serde(default)]
    pub include_related: bool,

    /// Maximum traversal depth for related tables. 0 means unbounded;
    /// tables beyond the bound are silently skipped.
    #[serde(default)]
    pub max_depth: u32,

    /// Strip document id fields at packaging time (document only).
    #[serde(default)]
    pub strip_ids: bool,
}

impl PackageFilter {
    /// Create a filter for the given entity names.
    pub fn for_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Filter clause for an entity, if configured.
    pub fn where_clause(&self, entity: &str) -> Option<&str> {
        self.where_clauses.get(entity).map(String::as_str)
    }

    /// Whether a column/field is excluded for an entity.
    pub fn is_excluded(&self, entity: &str, column: &str) -> bool {
        self.excluded_columns
            .get(entity)
            .is_some_and(|cols| cols.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }
}

/// Deployment behavior options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentOptions {
    /// On conflict with an existing record, leave the target untouched
    /// but still record the key mapping.
    #[serde(default)]
    pub skip_existing: bool,

    /// On conflict with an existing record, update its non-key fields.
    #[serde(default)]
    pub update_existing: bool,

    /// During dry-run, also check that every relationship's tables are
    /// present in the package.
    #[serde(default)]
    pub validate_references: bool,

    /// Create missing target tables/collections from packaged schema.
    #[serde(default)]
    pub create_missing: bool,

    /// Recreate captured indexes after data load (document only).
    #[serde(default)]
    pub rebuild_indexes: bool,

    /// Rows/documents per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Keep deploying remaining entities after a failure.
    #[serde(default)]
    pub continue_on_error: bool,

    /// Validate without touching the target store.
    #[serde(default)]
    pub dry_run: bool,

    /// Free-form metadata copied onto the deployment record.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Default for DeploymentOptions {
    fn default() -> Self {
        Self {
            skip_existing: false,
            update_existing: false,
            validate_references: false,
            create_missing: false,
            rebuild_indexes: false,
            batch_size: DEFAULT_BATCH_SIZE,
            continue_on_error: false,
            dry_run: false,
            metadata: BTreeMap::new(),
        }
    }
}
