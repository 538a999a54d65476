//! Error types for packaging and deployment operations.

use thiserror::Error;

/// Main error type for promotion operations.
#[derive(Error, Debug)]
pub enum PromoteError {
    /// Configuration error (invalid YAML, missing fields, conflicting options).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Package is structurally invalid (missing payload, kind/payload mismatch).
    #[error("Invalid package: {0}")]
    Package(String),

    /// Schema or collection introspection failed.
    #[error("Introspection failed: {0}")]
    Introspection(String),

    /// Query against a source or target store failed.
    #[error("Query failed for {entity}: {message}")]
    Query { entity: String, message: String },

    /// Deployment of a specific table or collection failed.
    #[error("Deploy failed for {entity}: {message}")]
    Deploy { entity: String, message: String },

    /// Existing record encountered without a skip or update policy.
    #[error("Record already exists in {entity} (key {key}) and no conflict policy is set")]
    Conflict { entity: String, key: String },

    /// Circular foreign-key dependency - deployment cannot be ordered.
    #[error("Circular dependency detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    /// A bounded store operation exceeded its timeout budget.
    #[error("Operation '{operation}' timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Reference field name is unsafe to use in a store update.
    #[error("Unsafe reference field name: '{0}'")]
    UnsafeFieldName(String),

    /// Backing store reported an error.
    #[error("Store error: {0}")]
    Store(String),

    /// IO error (file operations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PromoteError {
    /// Create a Query error for a table or collection.
    pub fn query(entity: impl Into<String>, message: impl Into<String>) -> Self {
        PromoteError::Query {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a Deploy error for a table or collection.
    pub fn deploy(entity: impl Into<String>, message: impl Into<String>) -> Self {
        PromoteError::Deploy {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a Conflict error for an existing record without a policy.
    pub fn conflict(entity: impl Into<String>, key: impl Into<String>) -> Self {
        PromoteError::Conflict {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for promotion operations.
pub type Result<T> = std::result::Result<T, PromoteError>;
