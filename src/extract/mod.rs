// ABOUTME: Source extraction collaborators turning tabular files into records
// ABOUTME: Detects file formats, applies column mapping, and reports per-file outcomes

pub mod csv;
pub mod sqlite;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::config::{CollectionConfig, SourceConfig};
use crate::engine::Record;

/// Tabular source formats understood by the extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Tsv,
    Sqlite,
}

impl SourceFormat {
    /// Detect the format from a file extension.
    ///
    /// # Examples
    ///
    /// ```
    /// # use collection_reconciler::extract::SourceFormat;
    /// # use std::path::Path;
    /// assert_eq!(SourceFormat::detect(Path::new("models.CSV")).unwrap(), SourceFormat::Csv);
    /// assert_eq!(SourceFormat::detect(Path::new("parts.sqlite3")).unwrap(), SourceFormat::Sqlite);
    /// assert!(SourceFormat::detect(Path::new("parts.xlsx")).is_err());
    /// ```
    pub fn detect(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "csv" => Ok(SourceFormat::Csv),
            "tsv" | "tab" => Ok(SourceFormat::Tsv),
            "db" | "sqlite" | "sqlite3" => Ok(SourceFormat::Sqlite),
            "" => bail!(
                "Cannot detect source format of '{}' without a file extension; set `format` explicitly",
                path.display()
            ),
            other => bail!(
                "Unsupported source file extension '.{}' for '{}'. Supported: .csv, .tsv, .db, .sqlite, .sqlite3",
                other,
                path.display()
            ),
        }
    }
}

/// Reads one source file into records.
pub trait Extractor: Send + Sync {
    fn extract(&self, source: &SourceConfig) -> Result<Vec<Record>>;
}

/// Pick the extractor for a source's format.
pub fn extractor_for(format: SourceFormat) -> Box<dyn Extractor> {
    match format {
        SourceFormat::Csv => Box::new(csv::CsvExtractor::new(b',')),
        SourceFormat::Tsv => Box::new(csv::CsvExtractor::new(b'\t')),
        SourceFormat::Sqlite => Box::new(sqlite::SqliteExtractor),
    }
}

/// Outcome of extracting a single source file.
#[derive(Debug)]
pub struct FileExtraction {
    pub path: PathBuf,
    pub result: Result<Vec<Record>>,
}

impl FileExtraction {
    pub fn record_count(&self) -> Option<usize> {
        self.result.as_ref().ok().map(Vec::len)
    }
}

/// Extract every source file of a collection independently.
///
/// A failure in one file does not stop the others; each outcome is returned
/// in source order and logged with its record count.
pub fn extract_collection(collection: &CollectionConfig) -> Vec<FileExtraction> {
    collection
        .sources
        .iter()
        .map(|source| {
            let result = source
                .resolved_format()
                .and_then(|format| extractor_for(format).extract(source))
                .with_context(|| format!("Failed to extract {}", source.path.display()));

            match &result {
                Ok(records) => tracing::info!(
                    "[{}] Extracted {} records from {}",
                    collection.name,
                    records.len(),
                    source.path.display()
                ),
                Err(e) => tracing::error!(
                    "[{}] Extraction failed for {}: {:?}",
                    collection.name,
                    source.path.display(),
                    e
                ),
            }

            FileExtraction {
                path: source.path.clone(),
                result,
            }
        })
        .collect()
}

/// Concatenate per-file records, failing if any file failed.
///
/// A partial source would make every record of the missing file look like a
/// deletion, so the collection is refused instead.
pub fn combine_extractions(extractions: Vec<FileExtraction>) -> Result<Vec<Record>> {
    let failed: Vec<String> = extractions
        .iter()
        .filter(|e| e.result.is_err())
        .map(|e| e.path.display().to_string())
        .collect();
    if !failed.is_empty() {
        bail!(
            "{} of {} source file(s) failed to extract: {}",
            failed.len(),
            extractions.len(),
            failed.join(", ")
        );
    }

    let mut records = Vec::new();
    for extraction in extractions {
        records.extend(extraction.result?);
    }
    Ok(records)
}

/// Maps source column positions to business field names.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    targets: Vec<Option<String>>,
}

impl ColumnMapping {
    /// Resolve the mapping for a file's header row.
    ///
    /// With no configured columns every header is kept under its own name.
    /// Otherwise only mapped headers are kept, renamed, and each mapped header
    /// must be present.
    pub fn resolve(headers: &[String], columns: &BTreeMap<String, String>) -> Result<Self> {
        if columns.is_empty() {
            let mut seen = HashSet::new();
            for header in headers {
                if !seen.insert(header.as_str()) {
                    bail!("Duplicate column header '{}'", header);
                }
            }
            return Ok(Self {
                targets: headers.iter().cloned().map(Some).collect(),
            });
        }

        for source_column in columns.keys() {
            if !headers.iter().any(|h| h.trim() == source_column.trim()) {
                bail!(
                    "Mapped column '{}' not found. Available columns: {}",
                    source_column,
                    headers.join(", ")
                );
            }
        }

        let mut used = HashSet::new();
        let targets = headers
            .iter()
            .map(|header| {
                columns
                    .iter()
                    .find(|(source_column, _)| source_column.trim() == header.trim())
                    .filter(|(source_column, _)| used.insert(source_column.as_str()))
                    .map(|(_, field)| field.clone())
            })
            .collect();
        Ok(Self { targets })
    }

    /// Build a record from one row of values in header order.
    pub fn apply<I>(&self, values: I) -> Record
    where
        I: IntoIterator<Item = Value>,
    {
        self.targets
            .iter()
            .zip(values)
            .filter_map(|(target, value)| target.as_ref().map(|field| (field.clone(), value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unmapped_keeps_all_columns() {
        let mapping =
            ColumnMapping::resolve(&headers(&["Model", "Type"]), &BTreeMap::new()).unwrap();
        let record = mapping.apply(vec![json!("A1"), json!("T1")]);
        assert_eq!(record.len(), 2);
        assert_eq!(record["Type"], json!("T1"));
    }

    #[test]
    fn test_mapping_renames_and_drops() {
        let mut columns = BTreeMap::new();
        columns.insert("Model No.".to_string(), "Model".to_string());
        let mapping =
            ColumnMapping::resolve(&headers(&["Notes", " Model No. "]), &columns).unwrap();
        let record = mapping.apply(vec![json!("ignore me"), json!("A1")]);
        assert_eq!(record.len(), 1);
        assert_eq!(record["Model"], json!("A1"));
    }

    #[test]
    fn test_missing_mapped_column_fails() {
        let mut columns = BTreeMap::new();
        columns.insert("Manufacturer".to_string(), "Mfr".to_string());
        let err = ColumnMapping::resolve(&headers(&["Model"]), &columns).unwrap_err();
        assert!(err.to_string().contains("Mapped column 'Manufacturer' not found"));
    }

    #[test]
    fn test_duplicate_headers_fail_without_mapping() {
        assert!(ColumnMapping::resolve(&headers(&["A", "A"]), &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_combine_fails_when_any_file_failed() {
        let extractions = vec![
            FileExtraction {
                path: PathBuf::from("a.csv"),
                result: Ok(vec![Record::new()]),
            },
            FileExtraction {
                path: PathBuf::from("b.csv"),
                result: Err(anyhow::anyhow!("boom")),
            },
        ];
        assert_eq!(extractions[0].record_count(), Some(1));
        let err = combine_extractions(extractions).unwrap_err();
        assert!(err.to_string().contains("1 of 2 source file(s)"));
        assert!(err.to_string().contains("b.csv"));
    }

    #[test]
    fn test_combine_concatenates_in_file_order() {
        let first: Record = serde_json::from_value(json!({"Model": "A1"})).unwrap();
        let second: Record = serde_json::from_value(json!({"Model": "B1"})).unwrap();
        let records = combine_extractions(vec![
            FileExtraction {
                path: PathBuf::from("a.csv"),
                result: Ok(vec![first.clone()]),
            },
            FileExtraction {
                path: PathBuf::from("b.csv"),
                result: Ok(vec![second.clone()]),
            },
        ])
        .unwrap();
        assert_eq!(records, vec![first, second]);
    }
}
