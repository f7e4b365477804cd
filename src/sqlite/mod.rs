// ABOUTME: SQLite helpers shared by the SQLite extractor and the SQLite store
// ABOUTME: Opens database files and reads whole tables as JSON-valued records

pub mod converter;
pub mod reader;

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;

/// Open a SQLite database file read-only.
///
/// The engine never writes to sources or stores, so the connection is opened
/// without write access and without creating missing files.
pub fn open_sqlite(path: &Path) -> Result<Connection> {
    if !path.exists() {
        bail!("SQLite database '{}' does not exist", path.display());
    }

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open SQLite database '{}'", path.display()))?;

    tracing::debug!("Opened SQLite database '{}' read-only", path.display());
    Ok(conn)
}
