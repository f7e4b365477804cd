// ABOUTME: Delimited text extraction (CSV/TSV) with a required header row
// ABOUTME: Cells become trimmed string values mapped through the source's column mapping

use anyhow::{Context, Result};
use serde_json::Value;

use super::{ColumnMapping, Extractor};
use crate::config::SourceConfig;
use crate::engine::Record;

/// Reads delimited text files. Every cell is extracted as a string.
pub struct CsvExtractor {
    delimiter: u8,
}

impl CsvExtractor {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }
}

impl Extractor for CsvExtractor {
    fn extract(&self, source: &SourceConfig) -> Result<Vec<Record>> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .trim(::csv::Trim::All)
            .from_path(&source.path)
            .with_context(|| format!("Failed to open {}", source.path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let mapping = ColumnMapping::resolve(&headers, &source.columns)?;

        let mut records = Vec::new();
        for (idx, row) in reader.records().enumerate() {
            // Header is line 1
            let row = row.with_context(|| format!("Failed to parse data row {}", idx + 1))?;
            if row.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            records.push(mapping.apply(row.iter().map(|cell| Value::String(cell.to_string()))));
        }

        tracing::debug!(
            "Read {} rows with {} columns from {}",
            records.len(),
            headers.len(),
            source.path.display()
        );

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn source(path: std::path::PathBuf, columns: &[(&str, &str)]) -> SourceConfig {
        SourceConfig {
            path,
            format: None,
            table: None,
            columns: columns
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn test_reads_rows_as_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.csv");
        std::fs::write(&path, "Model,Mfr,Qty\nA1 , X,5\nB1,Y,\n").unwrap();

        let records = CsvExtractor::new(b',').extract(&source(path, &[])).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Model"], json!("A1"));
        assert_eq!(records[0]["Qty"], json!("5"));
        assert_eq!(records[1]["Qty"], json!(""));
    }

    #[test]
    fn test_skips_blank_rows_and_strips_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.csv");
        std::fs::write(&path, "\u{feff}Model,Mfr\nA1,X\n,\nB1,Y\n").unwrap();

        let records = CsvExtractor::new(b',').extract(&source(path, &[])).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].contains_key("Model"));
    }

    #[test]
    fn test_tab_delimited_with_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.tsv");
        std::fs::write(&path, "Model No.\tManufacturer\tNotes\nA1\tX\tskip\n").unwrap();

        let records = CsvExtractor::new(b'\t')
            .extract(&source(path, &[("Model No.", "Model"), ("Manufacturer", "Mfr")]))
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Model"], json!("A1"));
        assert_eq!(records[0]["Mfr"], json!("X"));
        assert!(!records[0].contains_key("Notes"));
    }

    #[test]
    fn test_ragged_row_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.csv");
        std::fs::write(&path, "Model,Mfr\nA1,X,extra\n").unwrap();

        let err = CsvExtractor::new(b',').extract(&source(path, &[])).unwrap_err();
        assert!(err.to_string().contains("data row 1"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = CsvExtractor::new(b',')
            .extract(&source("/nonexistent/models.csv".into(), &[]))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to open"));
    }
}
