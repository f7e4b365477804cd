// ABOUTME: Error taxonomy for the reconciliation engine
// ABOUTME: Configuration, store uniqueness, and value comparison failures

use thiserror::Error;

/// Errors raised by the pure reconciliation engine.
///
/// Every variant is scoped to a single collection. Callers catch them at the
/// collection boundary and move on to the next collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// A composite key spec (or field list) is empty or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store holds more than one record for a compare key.
    #[error(
        "uniqueness violation: store holds {count} records for key '{key}' \
         under compare key [{}]",
        .compare_key_spec.join(", ")
    )]
    UniquenessViolation {
        key: String,
        count: usize,
        compare_key_spec: Vec<String>,
    },

    /// A field value has a shape the engine cannot normalize.
    #[error("comparison error on field '{field}': {message}")]
    Comparison { field: String, message: String },
}

impl ReconcileError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn comparison(field: &str, message: impl Into<String>) -> Self {
        Self::Comparison {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
