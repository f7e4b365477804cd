// ABOUTME: SQLite table extraction for sources delivered as database files
// ABOUTME: Reads one configured table and maps its columns into records

use anyhow::{Context, Result};

use super::{ColumnMapping, Extractor};
use crate::config::SourceConfig;
use crate::engine::Record;
use crate::sqlite::{open_sqlite, reader::read_table};

pub struct SqliteExtractor;

impl Extractor for SqliteExtractor {
    fn extract(&self, source: &SourceConfig) -> Result<Vec<Record>> {
        let table = source.table.as_deref().with_context(|| {
            format!(
                "SQLite source {} needs a `table` to read",
                source.path.display()
            )
        })?;

        let conn = open_sqlite(&source.path)?;
        let data = read_table(&conn, table)?;
        let mapping = ColumnMapping::resolve(&data.columns, &source.columns)
            .with_context(|| format!("Failed to map columns of table '{}'", table))?;

        Ok(data
            .rows
            .into_iter()
            .map(|row| mapping.apply(row.values))
            .collect())
    }
}
