// ABOUTME: First-seen-wins deduplication of extracted source records
// ABOUTME: Single hash-based pass producing unique records and grouped duplicate counts

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::error::ReconcileError;
use super::key::{full_record_key, KeySpec};
use super::record::{Normalizer, Record};

/// How records are keyed for deduplication.
#[derive(Debug, Clone)]
pub enum DedupStrategy {
    /// Collapse records sharing the same composite key.
    Fields(KeySpec),
    /// Collapse only records whose every field normalizes identically.
    FullRecord,
}

impl DedupStrategy {
    fn key(&self, record: &Record, normalizer: &Normalizer) -> Result<String, ReconcileError> {
        match self {
            DedupStrategy::Fields(spec) => spec.build_key(record, normalizer),
            DedupStrategy::FullRecord => full_record_key(record, normalizer),
        }
    }

    /// Field names of the dedup key, empty for full-record deduplication.
    pub fn key_fields(&self) -> Vec<String> {
        match self {
            DedupStrategy::Fields(spec) => spec.fields().to_vec(),
            DedupStrategy::FullRecord => Vec::new(),
        }
    }
}

/// A repeated record, reported once per key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateEntry {
    /// The first repeat observed for this key (the canonical record stays in `unique`)
    pub record: Record,
    pub key: String,
    /// Occurrences beyond the first
    pub count: usize,
}

/// Output of a single deduplication pass.
#[derive(Debug, Clone, Default)]
pub struct DedupOutcome {
    pub unique: Vec<Record>,
    pub duplicates: Vec<DuplicateEntry>,
}

impl DedupOutcome {
    /// Total number of records dropped as duplicates.
    pub fn duplicate_count(&self) -> usize {
        self.duplicates.iter().map(|d| d.count).sum()
    }

    /// Package the outcome for the report writer.
    pub fn into_report(self, strategy: &DedupStrategy) -> DuplicateReport {
        let duplicate_count = self.duplicate_count();
        DuplicateReport {
            unique_count: self.unique.len(),
            duplicate_count,
            dedup_key_spec: strategy.key_fields(),
            duplicates: self.duplicates,
            unique_records: self.unique,
        }
    }
}

/// Deduplication result as handed to the report writer.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateReport {
    pub unique_records: Vec<Record>,
    pub duplicates: Vec<DuplicateEntry>,
    pub unique_count: usize,
    pub duplicate_count: usize,
    pub dedup_key_spec: Vec<String>,
}

/// Deduplicate `records`, keeping the first record seen for each key.
///
/// `unique` keeps first-occurrence order. `duplicates` holds one entry per
/// repeated key, ordered by the first repeat, with `count` accumulating every
/// further repeat. Runs in linear time.
pub fn dedupe(
    records: Vec<Record>,
    strategy: &DedupStrategy,
    normalizer: &Normalizer,
) -> Result<DedupOutcome, ReconcileError> {
    let mut seen: HashSet<String> = HashSet::with_capacity(records.len());
    let mut duplicate_index: HashMap<String, usize> = HashMap::new();
    let mut outcome = DedupOutcome::default();

    for record in records {
        let key = strategy.key(&record, normalizer)?;

        if !seen.contains(&key) {
            seen.insert(key);
            outcome.unique.push(record);
            continue;
        }

        match duplicate_index.get(&key) {
            Some(&idx) => outcome.duplicates[idx].count += 1,
            None => {
                duplicate_index.insert(key.clone(), outcome.duplicates.len());
                outcome.duplicates.push(DuplicateEntry {
                    record,
                    key,
                    count: 1,
                });
            }
        }
    }

    tracing::debug!(
        "Deduplicated into {} unique records ({} duplicates across {} keys)",
        outcome.unique.len(),
        outcome.duplicate_count(),
        outcome.duplicates.len()
    );

    Ok(outcome)
}
