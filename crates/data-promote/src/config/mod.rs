//! Configuration loading and validation.

mod types;

pub use types::*;

use crate::error::{PromoteError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.package.name.is_empty() {
            return Err(PromoteError::Config("package name is empty".to_string()));
        }
        if self.package.version.is_empty() {
            return Err(PromoteError::Config("package version is empty".to_string()));
        }
        if self.filter.tables.is_empty() {
            return Err(PromoteError::Config(
                "filter lists no tables or collections".to_string(),
            ));
        }
        self.deployment.validate()
    }

    /// Compute a SHA256 hash of the configuration, for audit metadata.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl DeploymentOptions {
    /// Validate option combinations.
    ///
    /// `skip_existing` and `update_existing` are mutually exclusive
    /// policies; with neither set, an existing record is a per-record
    /// error at deploy time.
    pub fn validate(&self) -> Result<()> {
        if self.skip_existing && self.update_existing {
            return Err(PromoteError::Config(
                "skip_existing and update_existing are mutually exclusive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PromoteError::Config("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
package:
  name: store-catalog
  version: 1.2.0
  author: ops
filter:
  tables: [customers, orders]
  where_clauses:
    orders: "status = 'open'"
  excluded_columns:
    customers: [password_hash]
  include_related: true
  max_depth: 2
deployment:
  skip_existing: true
  batch_size: 50
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.package.name, "store-catalog");
        assert_eq!(config.filter.tables.len(), 2);
        assert_eq!(config.filter.where_clause("orders"), Some("status = 'open'"));
        assert!(config.filter.is_excluded("customers", "PASSWORD_HASH"));
        assert!(!config.filter.is_excluded("customers", "name"));
        assert!(config.deployment.skip_existing);
        assert_eq!(config.deployment.batch_size, 50);
        // Unset fields take defaults
        assert!(!config.deployment.update_existing);
        assert!(!config.deployment.dry_run);
    }

    #[test]
    fn test_validate_rejects_conflicting_policies() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.deployment.update_existing = true;
        assert!(matches!(config.validate(), Err(PromoteError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.deployment.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_tables() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.filter.tables.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = Config::from_yaml(SAMPLE).unwrap();
        let mut b = a.clone();
        b.package.version = "1.3.0".to_string();
        assert_ne!(a.hash(), b.hash());
    }
}
