// ABOUTME: Keyed-set reconciliation of source records against a store snapshot
// ABOUTME: Groups both sides by compare key and classifies keys as add, delete, match, or update

use serde::Serialize;
use std::collections::HashMap;

use super::differ::{diff, CompareSpec, DiffResult, FieldDifference, UpdateReason};
use super::error::ReconcileError;
use super::record::Record;

/// Final per-key outcome of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyOutcome {
    Add,
    Delete,
    Match,
    Update,
}

/// Records that exist on only one side, grouped under their compare key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyedGroup {
    pub key: String,
    pub records: Vec<Record>,
    pub action: KeyOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEntry {
    pub key: String,
    pub source_records: Vec<Record>,
    pub store_record: Record,
    pub differences: Vec<FieldDifference>,
    pub reason: UpdateReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchEntry {
    pub key: String,
    pub source_records: Vec<Record>,
    pub store_record: Record,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    /// Source records to add, summed across grouped keys
    pub additions: usize,
    /// Store records to delete
    pub deletions: usize,
    /// Keys needing an update
    pub updates: usize,
    /// Keys already in sync
    pub matches: usize,
}

/// The actionable result of reconciling one collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSet {
    pub additions: Vec<KeyedGroup>,
    pub deletions: Vec<KeyedGroup>,
    pub updates: Vec<UpdateEntry>,
    pub matches: Vec<MatchEntry>,
    pub counts: ChangeCounts,
    pub compare_key_spec: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_match_fields: Option<Vec<String>>,
}

impl ChangeSet {
    /// True when the store already mirrors the source.
    pub fn is_in_sync(&self) -> bool {
        self.counts.additions == 0 && self.counts.deletions == 0 && self.counts.updates == 0
    }
}

/// Records grouped by compare key, remembering first-seen key order.
///
/// Local to a single reconciliation call.
#[derive(Debug, Default)]
struct KeyedGroups {
    order: Vec<String>,
    groups: HashMap<String, Vec<Record>>,
}

impl KeyedGroups {
    fn build(records: &[Record], spec: &CompareSpec) -> Result<Self, ReconcileError> {
        let mut grouped = KeyedGroups::default();
        for record in records {
            let key = spec.key.build_key(record, &spec.normalizer)?;
            match grouped.groups.get_mut(&key) {
                Some(group) => group.push(record.clone()),
                None => {
                    grouped.order.push(key.clone());
                    grouped.groups.insert(key, vec![record.clone()]);
                }
            }
        }
        Ok(grouped)
    }

    fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Record>)> {
        self.order
            .iter()
            .filter_map(move |key| self.groups.get(key).map(|group| (key, group)))
    }
}

/// Reconcile source records against the store snapshot.
///
/// Source records may share a compare key (the compare key can be coarser
/// than the dedup key). Store records may not: a store-side key with more
/// than one record yields a [`ReconcileError::UniquenessViolation`] and no
/// partial change-set.
///
/// Additions, updates, and matches follow source first-seen key order;
/// deletions follow store order.
pub fn reconcile(
    source: &[Record],
    store: &[Record],
    spec: &CompareSpec,
) -> Result<ChangeSet, ReconcileError> {
    let source_groups = KeyedGroups::build(source, spec)?;
    let store_groups = KeyedGroups::build(store, spec)?;

    if let Some((key, group)) = store_groups.iter().find(|(_, group)| group.len() > 1) {
        return Err(ReconcileError::UniquenessViolation {
            key: key.clone(),
            count: group.len(),
            compare_key_spec: spec.key.fields().to_vec(),
        });
    }

    let mut change_set = ChangeSet {
        additions: Vec::new(),
        deletions: Vec::new(),
        updates: Vec::new(),
        matches: Vec::new(),
        counts: ChangeCounts::default(),
        compare_key_spec: spec.key.fields().to_vec(),
        exact_match_fields: spec.mode.exact_match_fields().map(|f| f.to_vec()),
    };

    for (key, source_records) in source_groups.iter() {
        let store_record = match store_groups.groups.get(key).and_then(|g| g.first()) {
            Some(record) => record,
            None => {
                change_set.counts.additions += source_records.len();
                change_set.additions.push(KeyedGroup {
                    key: key.clone(),
                    records: source_records.clone(),
                    action: KeyOutcome::Add,
                });
                continue;
            }
        };

        let outcome = diff(source_records, store_record, spec)?;
        match outcome.result {
            DiffResult::Update(reason) => {
                change_set.counts.updates += 1;
                change_set.updates.push(UpdateEntry {
                    key: key.clone(),
                    source_records: source_records.clone(),
                    store_record: store_record.clone(),
                    differences: outcome.differences,
                    reason,
                });
            }
            DiffResult::Match => {
                change_set.counts.matches += 1;
                change_set.matches.push(MatchEntry {
                    key: key.clone(),
                    source_records: source_records.clone(),
                    store_record: store_record.clone(),
                });
            }
        }
    }

    for (key, store_records) in store_groups.iter() {
        if source_groups.groups.contains_key(key) {
            continue;
        }
        change_set.counts.deletions += store_records.len();
        change_set.deletions.push(KeyedGroup {
            key: key.clone(),
            records: store_records.clone(),
            action: KeyOutcome::Delete,
        });
    }

    tracing::debug!(
        "Reconciled {} source / {} store records: {} to add, {} to delete, {} to update, {} matched",
        source.len(),
        store.len(),
        change_set.counts.additions,
        change_set.counts.deletions,
        change_set.counts.updates,
        change_set.counts.matches
    );

    Ok(change_set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::differ::{ChangeType, DiffMode};
    use crate::engine::key::KeySpec;
    use serde_json::json;

    fn records(values: serde_json::Value) -> Vec<Record> {
        serde_json::from_value(values).unwrap()
    }

    fn spec(fields: &[&str]) -> CompareSpec {
        CompareSpec::new(KeySpec::new(fields.iter().copied()).unwrap())
    }

    #[test]
    fn test_source_only_key_is_an_addition() {
        let change_set = reconcile(
            &records(json!([{"Model": "A1", "Mfr": "X"}])),
            &[],
            &spec(&["Model"]),
        )
        .unwrap();
        assert_eq!(change_set.counts.additions, 1);
        assert_eq!(change_set.counts.deletions, 0);
        assert_eq!(change_set.counts.updates, 0);
        assert_eq!(change_set.additions[0].action, KeyOutcome::Add);
        assert!(!change_set.is_in_sync());
    }

    #[test]
    fn test_store_only_key_is_a_deletion() {
        let change_set = reconcile(
            &[],
            &records(json!([{"Model": "Z9", "_id": 7}])),
            &spec(&["Model"]),
        )
        .unwrap();
        assert_eq!(change_set.counts.deletions, 1);
        assert_eq!(change_set.deletions[0].key, "z9");
        assert_eq!(change_set.deletions[0].action, KeyOutcome::Delete);
    }

    #[test]
    fn test_grouped_additions_count_every_record() {
        let change_set = reconcile(
            &records(json!([
                {"Model": "A1", "Rev": "1"},
                {"Model": "A1", "Rev": "2"},
                {"Model": "B1"}
            ])),
            &[],
            &spec(&["Model"]),
        )
        .unwrap();
        assert_eq!(change_set.additions.len(), 2);
        assert_eq!(change_set.counts.additions, 3);
        assert_eq!(change_set.additions[0].records.len(), 2);
    }

    #[test]
    fn test_match_and_update_are_per_key() {
        let change_set = reconcile(
            &records(json!([
                {"Model": "A1", "Type": "T1"},
                {"Model": "B1", "Type": "T1"}
            ])),
            &records(json!([
                {"Model": "B1", "Type": "T2"},
                {"Model": "A1", "Type": "t1"}
            ])),
            &spec(&["Model"]),
        )
        .unwrap();
        assert_eq!(change_set.counts.matches, 1);
        assert_eq!(change_set.counts.updates, 1);
        assert_eq!(change_set.matches[0].key, "a1");
        assert_eq!(change_set.updates[0].key, "b1");
        assert_eq!(
            change_set.updates[0].differences[0].change_type,
            ChangeType::FieldModified
        );
        assert!(change_set.exact_match_fields.is_none());
    }

    #[test]
    fn test_duplicate_store_key_is_a_uniqueness_violation() {
        let err = reconcile(
            &records(json!([{"Model": "A1"}])),
            &records(json!([{"Model": "A1"}, {"Model": " a1"}])),
            &spec(&["Model"]),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ReconcileError::UniquenessViolation {
                key: "a1".to_string(),
                count: 2,
                compare_key_spec: vec!["Model".to_string()],
            }
        );
    }

    #[test]
    fn test_multiple_source_records_against_one_store_record_is_update() {
        let change_set = reconcile(
            &records(json!([{"Model": "A1", "Rev": "1"}, {"Model": "A1", "Rev": "2"}])),
            &records(json!([{"Model": "A1", "Rev": "1"}])),
            &spec(&["Model"]),
        )
        .unwrap();
        assert_eq!(change_set.counts.updates, 1);
        assert!(matches!(
            change_set.updates[0].reason,
            UpdateReason::CardinalityMismatch { source_records: 2, .. }
        ));
    }

    #[test]
    fn test_exact_match_fields_are_carried_on_the_change_set() {
        let spec = spec(&["Model"]).with_mode(DiffMode::Subset(vec!["Type".to_string()]));
        let change_set = reconcile(&[], &[], &spec).unwrap();
        assert_eq!(change_set.exact_match_fields, Some(vec!["Type".to_string()]));
        assert!(change_set.is_in_sync());
    }
}
