// ABOUTME: SQLite table introspection and whole-table reading
// ABOUTME: Functions to list tables and read rows with their rowid in stable order

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use serde_json::Value as JsonValue;

use super::converter::sqlite_value_to_json;

/// List all user tables in a SQLite database
///
/// Queries sqlite_master for user-created tables, excluding sqlite_* system
/// tables. Returned sorted by name.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare statement to list tables")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::debug!("Found {} user tables in SQLite database", tables.len());

    Ok(tables)
}

/// A whole table read into memory, values already converted to JSON scalars.
#[derive(Debug, Clone)]
pub struct TableData {
    /// Column names in declaration order
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone)]
pub struct TableRow {
    pub rowid: i64,
    /// Values in `columns` order
    pub values: Vec<JsonValue>,
}

/// Read all rows of a table ordered by rowid
///
/// # Arguments
///
/// * `conn` - SQLite database connection
/// * `table` - Table name; validated here before it is used in SQL
///
/// # Errors
///
/// Fails on an invalid table name, on a table that does not exist (the
/// error lists the available tables), or on WITHOUT ROWID tables.
///
/// # Examples
///
/// ```no_run
/// # use collection_reconciler::sqlite::{open_sqlite, reader::read_table};
/// # fn example() -> anyhow::Result<()> {
/// let conn = open_sqlite(std::path::Path::new("catalog.db"))?;
/// let data = read_table(&conn, "models")?;
/// println!("Read {} rows with columns {:?}", data.rows.len(), data.columns);
/// # Ok(())
/// # }
/// ```
pub fn read_table(conn: &Connection, table: &str) -> Result<TableData> {
    crate::utils::validate_identifier(table).context("Invalid table name for data reading")?;

    let tables = list_tables(conn)?;
    if !tables.iter().any(|t| t == table) {
        bail!(
            "Table '{}' not found. Available tables: {}",
            table,
            if tables.is_empty() {
                "(none)".to_string()
            } else {
                tables.join(", ")
            }
        );
    }

    // Note: table name is validated above
    let query = format!(
        "SELECT rowid, * FROM {} ORDER BY rowid",
        crate::utils::quote_ident(table)
    );

    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to prepare statement for table '{}'", table))?;

    // First column is rowid, actual columns start at index 1
    let columns: Vec<String> = stmt
        .column_names()
        .iter()
        .skip(1)
        .map(|s| s.to_string())
        .collect();
    let column_count = columns.len();

    let raw_rows = stmt
        .query_map([], |row| {
            let rowid: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                let value: rusqlite::types::Value = row.get(idx + 1)?;
                values.push(value);
            }
            Ok((rowid, values))
        })
        .with_context(|| format!("Failed to query rows from table '{}'", table))?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to collect rows from table '{}'", table))?;

    let mut rows = Vec::with_capacity(raw_rows.len());
    for (rowid, values) in raw_rows {
        let values = values
            .iter()
            .zip(&columns)
            .map(|(value, column)| {
                sqlite_value_to_json(value).with_context(|| {
                    format!("Failed to convert column '{}' of rowid {}", column, rowid)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        rows.push(TableRow { rowid, values });
    }

    tracing::debug!("Read {} rows from table '{}'", rows.len(), table);

    Ok(TableData { columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_db() -> (tempfile::TempDir, std::path::PathBuf) {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("test.db");

        let conn = Connection::open(&db_path).unwrap();

        conn.execute(
            "CREATE TABLE models (
                model TEXT NOT NULL,
                mfr TEXT,
                qty INTEGER,
                price REAL
            )",
            [],
        )
        .unwrap();
        conn.execute("CREATE TABLE parts (id INTEGER PRIMARY KEY, name TEXT)", [])
            .unwrap();

        conn.execute(
            "INSERT INTO models (model, mfr, qty, price) VALUES ('A1', 'X', 5, 9.5)",
            [],
        )
        .unwrap();
        conn.execute("INSERT INTO models (model, mfr) VALUES ('B1', 'Y')", [])
            .unwrap();

        (temp_dir, db_path)
    }

    #[test]
    fn test_list_tables() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let tables = list_tables(&conn).unwrap();
        assert_eq!(tables, vec!["models", "parts"]);
    }

    #[test]
    fn test_read_table() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let data = read_table(&conn, "models").unwrap();
        assert_eq!(data.columns, vec!["model", "mfr", "qty", "price"]);
        assert_eq!(data.rows.len(), 2);
        assert_eq!(data.rows[0].rowid, 1);
        assert_eq!(data.rows[0].values[0], serde_json::json!("A1"));
        assert_eq!(data.rows[0].values[2], serde_json::json!(5));
        assert_eq!(data.rows[0].values[3], serde_json::json!(9.5));
        assert_eq!(data.rows[1].values[2], JsonValue::Null);
    }

    #[test]
    fn test_read_missing_table_lists_available() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        let err = read_table(&conn, "widgets").unwrap_err();
        assert!(err.to_string().contains("Available tables: models, parts"));
    }

    #[test]
    fn test_read_table_invalid_name() {
        let (_temp_dir, db_path) = create_test_db();
        let conn = Connection::open(db_path).unwrap();

        // SQL injection attempt
        let result = read_table(&conn, "models; DROP TABLE models;");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid table name"));
    }
}
