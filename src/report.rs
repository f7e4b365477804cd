// ABOUTME: Report writer serializing duplicate reports and change-sets to JSON artifacts
// ABOUTME: Each artifact is wrapped in an envelope with run id, timestamp, and content digest

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::engine::{ChangeSet, DuplicateReport};

pub const DUPLICATES_FILE: &str = "duplicates.json";
pub const CHANGESET_FILE: &str = "changeset.json";

/// Wrapper written around every report.
#[derive(Debug, Serialize)]
pub struct ReportEnvelope<'a, T: Serialize> {
    pub run_id: Uuid,
    pub collection: &'a str,
    pub generated_at: DateTime<Utc>,
    /// `sha256:<hex>` of the serialized report; stable for identical inputs
    pub digest: String,
    pub report: &'a T,
}

/// Paths of the artifacts written for one collection.
#[derive(Debug, Clone)]
pub struct WrittenReports {
    pub duplicates: PathBuf,
    pub changeset: PathBuf,
}

/// Writes per-collection artifacts under `<output_dir>/<collection>/`.
#[derive(Debug, Clone)]
pub struct Reporter {
    output_dir: PathBuf,
    run_id: Uuid,
}

impl Reporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn collection_dir(&self, collection: &str) -> PathBuf {
        self.output_dir.join(collection)
    }

    /// Write both reports for a collection.
    ///
    /// Files are staged under temporary names and renamed once both are
    /// written, so a failure never leaves a half-written pair behind.
    pub async fn write_collection(
        &self,
        collection: &str,
        duplicates: &DuplicateReport,
        changes: &ChangeSet,
    ) -> Result<WrittenReports> {
        let dir = self.collection_dir(collection);
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create report directory {:?}", dir))?;

        let generated_at = Utc::now();
        let duplicates_body = self.render(collection, generated_at, duplicates)?;
        let changeset_body = self.render(collection, generated_at, changes)?;

        let written = WrittenReports {
            duplicates: dir.join(DUPLICATES_FILE),
            changeset: dir.join(CHANGESET_FILE),
        };
        let staged_duplicates = staging_path(&written.duplicates);
        let staged_changeset = staging_path(&written.changeset);

        fs::write(&staged_duplicates, duplicates_body)
            .await
            .with_context(|| format!("Failed to write {:?}", staged_duplicates))?;
        fs::write(&staged_changeset, changeset_body)
            .await
            .with_context(|| format!("Failed to write {:?}", staged_changeset))?;

        fs::rename(&staged_duplicates, &written.duplicates)
            .await
            .with_context(|| format!("Failed to move report into {:?}", written.duplicates))?;
        fs::rename(&staged_changeset, &written.changeset)
            .await
            .with_context(|| format!("Failed to move report into {:?}", written.changeset))?;

        tracing::debug!("Wrote reports for '{}' to {:?}", collection, dir);
        Ok(written)
    }

    /// Remove the artifacts an earlier run left for `collection`.
    ///
    /// Called when the collection fails in this run, so the output directory
    /// never holds a report that does not belong to the latest attempt.
    /// Returns how many files were removed.
    pub async fn discard_collection(&self, collection: &str) -> Result<usize> {
        let dir = self.collection_dir(collection);
        let mut removed = 0;
        for name in [DUPLICATES_FILE, CHANGESET_FILE] {
            let path = dir.join(name);
            for candidate in [staging_path(&path), path] {
                match fs::remove_file(&candidate).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => {
                        return Err(e).with_context(|| {
                            format!("Failed to remove stale report {:?}", candidate)
                        })
                    }
                }
            }
        }
        // Only succeeds when nothing else lives there
        if fs::remove_dir(&dir).await.is_ok() {
            tracing::debug!("Removed empty report directory {:?}", dir);
        }
        Ok(removed)
    }

    fn render<T: Serialize>(
        &self,
        collection: &str,
        generated_at: DateTime<Utc>,
        report: &T,
    ) -> Result<String> {
        let envelope = ReportEnvelope {
            run_id: self.run_id,
            collection,
            generated_at,
            digest: digest(report)?,
            report,
        };
        serde_json::to_string_pretty(&envelope)
            .with_context(|| format!("Failed to serialize report for '{}'", collection))
    }
}

/// Content digest of a report's canonical JSON serialization.
pub fn digest<T: Serialize>(report: &T) -> Result<String> {
    let bytes = serde_json::to_vec(report).context("Failed to serialize report for digest")?;
    let hash = Sha256::digest(&bytes);
    let hex: String = hash.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(format!("sha256:{}", hex))
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{dedupe, reconcile, CompareSpec, DedupStrategy, KeySpec, Normalizer, Record};
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn sample_reports() -> (DuplicateReport, ChangeSet) {
        let key = KeySpec::new(["Model"]).unwrap();
        let strategy = DedupStrategy::Fields(key.clone());
        let source = vec![
            record(json!({"Model": "A1", "Type": "T1"})),
            record(json!({"Model": "A1", "Type": "T1"})),
        ];
        let outcome = dedupe(source, &strategy, &Normalizer::new()).unwrap();
        let store = vec![record(json!({"Model": "A1", "Type": "T2"}))];
        let changes = reconcile(&outcome.unique, &store, &CompareSpec::new(key)).unwrap();
        (outcome.into_report(&strategy), changes)
    }

    #[test]
    fn test_digest_is_stable() {
        let (_, changes) = sample_reports();
        let first = digest(&changes).unwrap();
        let second = digest(&changes.clone()).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("sha256:"));
        assert_eq!(first.len(), "sha256:".len() + 64);
    }

    #[tokio::test]
    async fn test_write_collection() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        let (duplicates, changes) = sample_reports();

        let written = reporter
            .write_collection("models", &duplicates, &changes)
            .await
            .unwrap();
        assert_eq!(written.changeset, dir.path().join("models").join(CHANGESET_FILE));

        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written.changeset).unwrap()).unwrap();
        assert_eq!(body["collection"], json!("models"));
        assert_eq!(body["run_id"], json!(reporter.run_id().to_string()));
        assert_eq!(body["digest"], json!(digest(&changes).unwrap()));
        assert_eq!(body["report"]["counts"]["updates"], json!(1));

        let body: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&written.duplicates).unwrap()).unwrap();
        assert_eq!(body["report"]["duplicate_count"], json!(1));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("models"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_discard_collection_removes_earlier_reports() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path());
        let (duplicates, changes) = sample_reports();
        reporter
            .write_collection("models", &duplicates, &changes)
            .await
            .unwrap();
        std::fs::write(dir.path().join("models").join("changeset.json.partial"), "{").unwrap();

        let removed = reporter.discard_collection("models").await.unwrap();
        assert_eq!(removed, 3);
        assert!(!dir.path().join("models").exists());

        // Nothing to remove is not an error
        assert_eq!(reporter.discard_collection("models").await.unwrap(), 0);
    }
}
