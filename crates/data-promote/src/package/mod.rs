//! The portable package artifact: a versioned, self-contained snapshot of
//! selected data plus the metadata needed to replay it in another
//! environment.
//!
//! A package is pure data. The packagers build it, the deployers consume
//! it, and the two never talk to each other directly - the package is
//! their sole contract.

mod database;
mod document;

pub use database::{DatabaseData, PkMapping, PkStrategy, Relationship, TableData};
pub use document::{
    CollectionData, DocumentData, DocumentReference, IdKind, IdMapping, IdStrategy, ReferenceType,
    DEFAULT_ID_FIELD,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{PromoteError, Result};

/// Declared kind of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    /// Relational payload.
    Database,
    /// Document payload.
    Document,
}

/// Root package artifact.
///
/// Exactly one payload must be populated, and it must agree with `kind`;
/// [`Package::validate`] enforces this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Package {
    /// Unique package identifier.
    pub id: String,

    /// Package name.
    pub name: String,

    /// Semantic version string.
    pub version: String,

    /// Declared payload kind.
    pub kind: PackageKind,

    /// Package author.
    pub author: String,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// Relational payload (kind = database).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseData>,

    /// Document payload (kind = document).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentData>,

    /// Ids of packages this package depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Whether parent/related rows were auto-included at packaging time.
    #[serde(default)]
    pub include_parent: bool,
}

impl Package {
    /// Create an empty package of the given kind.
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        author: impl Into<String>,
        kind: PackageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            version: version.into(),
            kind,
            author: author.into(),
            created_at: Utc::now(),
            metadata: BTreeMap::new(),
            database: None,
            document: None,
            dependencies: Vec::new(),
            include_parent: false,
        }
    }

    /// Validate the kind/payload agreement invariant.
    pub fn validate(&self) -> Result<()> {
        match (self.kind, &self.database, &self.document) {
            (PackageKind::Database, Some(_), None) => Ok(()),
            (PackageKind::Document, None, Some(_)) => Ok(()),
            (_, Some(_), Some(_)) => Err(PromoteError::Package(
                "package carries both database and document payloads".to_string(),
            )),
            (PackageKind::Database, None, _) => Err(PromoteError::Package(format!(
                "package '{}' is declared kind=database but has no database payload",
                self.name
            ))),
            (PackageKind::Document, _, None) => Err(PromoteError::Package(format!(
                "package '{}' is declared kind=document but has no document payload",
                self.name
            ))),
        }
    }

    /// Export the package to its JSON wire form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Import a package from its JSON wire form.
    ///
    /// Accepts exactly the structure produced by [`Package::to_json`];
    /// unknown or malformed input fails with a deserialization error
    /// rather than a best-effort parse.
    pub fn from_json(json: &str) -> Result<Self> {
        let package: Self = serde_json::from_str(json)?;
        package.validate()?;
        Ok(package)
    }

    /// SHA256 checksum over the canonical JSON form, hex-encoded.
    pub fn checksum(&self) -> Result<String> {
        let json = serde_json::to_string(self)?;
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Serialized size in bytes of the canonical JSON form.
    pub fn size_bytes(&self) -> Result<usize> {
        Ok(serde_json::to_string(self)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Record;

    fn database_package() -> Package {
        let mut package = Package::new("inventory", "1.0.0", "ops", PackageKind::Database);
        package.database = Some(DatabaseData {
            tables: vec![TableData {
                name: "customers".to_string(),
                columns: vec![],
                primary_key: vec!["id".to_string()],
                foreign_keys: vec![],
                rows: vec![Record::new().with("id", 1i64).with("name", "A")],
                row_count: 1,
            }],
            pk_mappings: BTreeMap::new(),
            relationships: vec![],
            sequence_info: BTreeMap::new(),
            dialect: "postgres".to_string(),
        });
        package
    }

    #[test]
    fn test_validate_kind_payload_agreement() {
        let package = database_package();
        assert!(package.validate().is_ok());

        let mut missing = package.clone();
        missing.database = None;
        assert!(matches!(
            missing.validate(),
            Err(PromoteError::Package(_))
        ));

        let mut mixed = package.clone();
        mixed.document = Some(DocumentData::default());
        assert!(mixed.validate().is_err());

        let mut wrong_kind = package;
        wrong_kind.kind = PackageKind::Document;
        assert!(wrong_kind.validate().is_err());
    }

    #[test]
    fn test_export_import_round_trip() {
        let package = database_package();
        let json = package.to_json().unwrap();
        let imported = Package::from_json(&json).unwrap();
        assert_eq!(imported, package);
    }

    #[test]
    fn test_import_rejects_unknown_structure() {
        assert!(Package::from_json("{\"bogus\": true}").is_err());
        assert!(Package::from_json("not json at all").is_err());
    }

    #[test]
    fn test_checksum_is_stable() {
        let package = database_package();
        let a = package.checksum().unwrap();
        let b = Package::from_json(&package.to_json().unwrap())
            .unwrap()
            .checksum()
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
