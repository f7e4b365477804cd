// ABOUTME: Composite key construction from ordered field lists
// ABOUTME: Produces deterministic keys insensitive to case and surrounding whitespace

use serde::{Deserialize, Serialize};

use super::error::ReconcileError;
use super::record::{Normalizer, Record};

/// Delimiter placed between normalized field values in a composite key.
pub const KEY_DELIMITER: &str = "|";

/// An ordered, non-empty list of field names forming a composite key.
///
/// Construction rejects empty lists, so any `KeySpec` handed to the engine
/// is guaranteed to produce a meaningful key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KeySpec {
    fields: Vec<String>,
}

impl KeySpec {
    /// Build a key spec from field names.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the list is empty, a field name is
    /// blank, or the same field appears twice.
    pub fn new<I, S>(fields: I) -> Result<Self, ReconcileError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() {
            return Err(ReconcileError::configuration(
                "composite key spec must name at least one field",
            ));
        }
        for (idx, field) in fields.iter().enumerate() {
            if field.trim().is_empty() {
                return Err(ReconcileError::configuration(format!(
                    "composite key spec has a blank field name at position {}",
                    idx
                )));
            }
            if fields[..idx].contains(field) {
                return Err(ReconcileError::configuration(format!(
                    "composite key spec lists field '{}' more than once",
                    field
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Build the canonical composite key for `record`.
    pub fn build_key(
        &self,
        record: &Record,
        normalizer: &Normalizer,
    ) -> Result<String, ReconcileError> {
        let parts = self
            .fields
            .iter()
            .map(|field| normalizer.normalize_field(record, field))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts.join(KEY_DELIMITER))
    }
}

impl TryFrom<Vec<String>> for KeySpec {
    type Error = ReconcileError;

    fn try_from(fields: Vec<String>) -> Result<Self, Self::Error> {
        KeySpec::new(fields)
    }
}

impl From<KeySpec> for Vec<String> {
    fn from(spec: KeySpec) -> Self {
        spec.fields
    }
}

/// Build a structural key over every field of `record`.
///
/// Used for deduplication when a collection names no dedup key: two records
/// collide only if all their fields normalize to the same values. Names and
/// values are escaped so a value containing `|` or `=` cannot mimic a
/// different set of fields.
pub fn full_record_key(
    record: &Record,
    normalizer: &Normalizer,
) -> Result<String, ReconcileError> {
    let mut names: Vec<&String> = record.keys().collect();
    names.sort();

    let mut parts = Vec::with_capacity(names.len());
    for name in names {
        let value = normalizer.normalize_field(record, name)?;
        // Empty fields are skipped so an absent field and a null one agree
        if !value.is_empty() {
            parts.push(format!("{}={}", escape_part(name), escape_part(&value)));
        }
    }
    Ok(parts.join(KEY_DELIMITER))
}

fn escape_part(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '|' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
