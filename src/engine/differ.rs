// ABOUTME: Per-key field comparison between source records and a store record
// ABOUTME: Decides MATCH vs UPDATE in full or exact-match-subset mode

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use super::error::ReconcileError;
use super::key::KeySpec;
use super::record::{strip_fields, Normalizer, Record};

/// Which fields take part in the match/update decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffMode {
    /// Compare the union of all fields on both sides.
    Full,
    /// Compare only the listed exact-match fields.
    Subset(Vec<String>),
}

impl DiffMode {
    /// Exact-match fields, if running in subset mode.
    pub fn exact_match_fields(&self) -> Option<&[String]> {
        match self {
            DiffMode::Full => None,
            DiffMode::Subset(fields) => Some(fields),
        }
    }
}

/// Everything the reconciler needs to align and compare one collection.
#[derive(Debug, Clone)]
pub struct CompareSpec {
    pub key: KeySpec,
    pub mode: DiffMode,
    /// Store-assigned identifiers removed from both sides before comparing
    pub identity_fields: Vec<String>,
    pub normalizer: Normalizer,
}

impl CompareSpec {
    pub fn new(key: KeySpec) -> Self {
        Self {
            key,
            mode: DiffMode::Full,
            identity_fields: Vec::new(),
            normalizer: Normalizer::new(),
        }
    }

    pub fn with_mode(mut self, mode: DiffMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_identity_fields(mut self, fields: Vec<String>) -> Self {
        self.identity_fields = fields;
        self
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    NoChange,
    FieldAdded,
    FieldRemoved,
    FieldModified,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDifference {
    pub field: String,
    pub source_value: Value,
    pub store_value: Value,
    pub change_type: ChangeType,
}

/// Verdict for one overlapping key. An update always carries its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffResult {
    Match,
    Update(UpdateReason),
}

/// Why an overlapping key needs an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateReason {
    FieldsDiffer,
    /// The key maps to a different number of records on each side
    CardinalityMismatch {
        source_records: usize,
        store_records: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiffOutcome {
    pub result: DiffResult,
    pub differences: Vec<FieldDifference>,
}

impl DiffOutcome {
    fn matched() -> Self {
        Self {
            result: DiffResult::Match,
            differences: Vec::new(),
        }
    }

    fn update(differences: Vec<FieldDifference>, reason: UpdateReason) -> Self {
        Self {
            result: DiffResult::Update(reason),
            differences,
        }
    }
}

/// Compare the source records under one key against the store record.
///
/// The store side always holds exactly one record here. If the source side
/// holds anything other than one record the key is reported as an update
/// without a field breakdown, since the mismatch itself is drift.
pub fn diff(
    source_group: &[Record],
    store_record: &Record,
    spec: &CompareSpec,
) -> Result<DiffOutcome, ReconcileError> {
    if source_group.len() != 1 {
        return Ok(DiffOutcome::update(
            Vec::new(),
            UpdateReason::CardinalityMismatch {
                source_records: source_group.len(),
                store_records: 1,
            },
        ));
    }

    let source = strip_fields(&source_group[0], &spec.identity_fields);
    let store = strip_fields(store_record, &spec.identity_fields);

    let differences = match &spec.mode {
        DiffMode::Full => diff_full(&source, &store, &spec.normalizer)?,
        DiffMode::Subset(fields) => diff_subset(&source, &store, fields, &spec.normalizer)?,
    };

    if differences.is_empty() {
        Ok(DiffOutcome::matched())
    } else {
        Ok(DiffOutcome::update(differences, UpdateReason::FieldsDiffer))
    }
}

fn diff_full(
    source: &Record,
    store: &Record,
    normalizer: &Normalizer,
) -> Result<Vec<FieldDifference>, ReconcileError> {
    let fields: BTreeSet<&String> = source.keys().chain(store.keys()).collect();

    let mut differences = Vec::new();
    for field in fields {
        let source_value = source.get(field.as_str());
        let store_value = store.get(field.as_str());
        let change_type = classify_field(field, source_value, store_value, normalizer)?;
        if change_type != ChangeType::NoChange {
            differences.push(difference(field, source_value, store_value, change_type));
        }
    }
    Ok(differences)
}

fn diff_subset(
    source: &Record,
    store: &Record,
    fields: &[String],
    normalizer: &Normalizer,
) -> Result<Vec<FieldDifference>, ReconcileError> {
    let mut differences = Vec::new();
    for field in fields {
        let source_value = source.get(field.as_str());
        let store_value = store.get(field.as_str());

        let source_empty = normalizer.normalize(field, source_value)?.is_empty();
        let store_empty = normalizer.normalize(field, store_value)?.is_empty();
        let equal = match (source_value, store_value) {
            _ if source_empty && store_empty => true,
            (Some(Value::String(a)), Some(Value::String(b))) => {
                a.trim().to_lowercase() == b.trim().to_lowercase()
            }
            (a, b) => a == b,
        };

        if !equal {
            let change_type = change_type(source_empty, store_empty, false);
            differences.push(difference(field, source_value, store_value, change_type));
        }
    }
    Ok(differences)
}

/// Classify a single field by comparing normalized values on both sides.
pub fn classify_field(
    field: &str,
    source_value: Option<&Value>,
    store_value: Option<&Value>,
    normalizer: &Normalizer,
) -> Result<ChangeType, ReconcileError> {
    let source = normalizer.normalize(field, source_value)?;
    let store = normalizer.normalize(field, store_value)?;
    Ok(change_type(source.is_empty(), store.is_empty(), source == store))
}

fn change_type(source_empty: bool, store_empty: bool, equal: bool) -> ChangeType {
    match (source_empty, store_empty) {
        (true, true) => ChangeType::NoChange,
        (false, true) => ChangeType::FieldAdded,
        (true, false) => ChangeType::FieldRemoved,
        (false, false) if equal => ChangeType::NoChange,
        (false, false) => ChangeType::FieldModified,
    }
}

fn difference(
    field: &str,
    source_value: Option<&Value>,
    store_value: Option<&Value>,
    change_type: ChangeType,
) -> FieldDifference {
    FieldDifference {
        field: field.to_string(),
        source_value: source_value.cloned().unwrap_or(Value::Null),
        store_value: store_value.cloned().unwrap_or(Value::Null),
        change_type,
    }
}
