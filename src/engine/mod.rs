// ABOUTME: Pure reconciliation engine - key building, dedup, keyed diffing, field comparison
// ABOUTME: Performs no I/O; callers pass immutable records in and receive structured results

pub mod dedup;
pub mod differ;
pub mod error;
pub mod key;
pub mod reconciler;
pub mod record;

pub use dedup::{dedupe, DedupOutcome, DedupStrategy, DuplicateEntry, DuplicateReport};
pub use differ::{
    classify_field, diff, ChangeType, CompareSpec, DiffMode, DiffOutcome, DiffResult,
    FieldDifference, UpdateReason,
};
pub use error::ReconcileError;
pub use key::{full_record_key, KeySpec, KEY_DELIMITER};
pub use reconciler::{
    reconcile, ChangeCounts, ChangeSet, KeyOutcome, KeyedGroup, MatchEntry, UpdateEntry,
};
pub use record::{strip_fields, Normalizer, Record};
