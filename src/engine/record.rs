// ABOUTME: Record representation and scalar value normalization
// ABOUTME: Shared by key building and field comparison so both agree on "empty"

use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::error::ReconcileError;

/// A single business record: field name to scalar value.
///
/// Field names are case-sensitive. Values are JSON scalars (string, number,
/// boolean, null); a field that is absent behaves exactly like one set to null.
pub type Record = serde_json::Map<String, Value>;

/// Normalizes field values for key building and comparison.
///
/// The universal empty marker is the empty string: null, absent, and blank
/// strings all collapse to it. Per-field exclusion lists can add further
/// values (for example `"0"`) that a collection wants treated as empty.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    empty_values: HashMap<String, HashSet<String>>,
}

impl Normalizer {
    /// Create a normalizer with only the universal empty marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a normalizer with per-field values that also count as empty.
    ///
    /// The listed values are normalized the same way record values are, so
    /// `" N/A "` in the list matches `"n/a"` in the data.
    pub fn with_empty_values(empty_values: &HashMap<String, Vec<String>>) -> Self {
        let empty_values = empty_values
            .iter()
            .map(|(field, values)| {
                let normalized = values
                    .iter()
                    .map(|v| normalize_text(v))
                    .filter(|v| !v.is_empty())
                    .collect::<HashSet<_>>();
                (field.clone(), normalized)
            })
            .filter(|(_, values)| !values.is_empty())
            .collect();
        Self { empty_values }
    }

    /// Normalize one field value to its canonical comparison string.
    ///
    /// Strings are trimmed and lowercased, numbers and booleans are
    /// stringified as-is, null/absent become the empty marker. Arrays and
    /// objects are not scalars and produce a comparison error.
    pub fn normalize(&self, field: &str, value: Option<&Value>) -> Result<String, ReconcileError> {
        let normalized = match value {
            None | Some(Value::Null) => return Ok(String::new()),
            Some(Value::String(s)) => normalize_text(s),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(Value::Array(_)) => {
                return Err(ReconcileError::comparison(
                    field,
                    "expected a scalar value, found an array",
                ))
            }
            Some(Value::Object(_)) => {
                return Err(ReconcileError::comparison(
                    field,
                    "expected a scalar value, found an object",
                ))
            }
        };

        match self.empty_values.get(field) {
            Some(excluded) if excluded.contains(&normalized) => Ok(String::new()),
            _ => Ok(normalized),
        }
    }

    /// Normalize the value stored under `field` in `record`.
    pub fn normalize_field(&self, record: &Record, field: &str) -> Result<String, ReconcileError> {
        self.normalize(field, record.get(field))
    }

    /// Whether `field` has any configured exclusion values.
    pub fn has_exclusions(&self, field: &str) -> bool {
        self.empty_values.contains_key(field)
    }
}

fn normalize_text(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Return a copy of `record` without the given store identity fields.
pub fn strip_fields(record: &Record, fields: &[String]) -> Record {
    record
        .iter()
        .filter(|(name, _)| !fields.iter().any(|f| f == *name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}
