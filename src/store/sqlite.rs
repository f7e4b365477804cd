// ABOUTME: SQLite store reading a table snapshot from a local database file
// ABOUTME: Rows carry their rowid under `_rowid` as the store identity field

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use super::{MissingCollection, Store, StoreKind};
use crate::engine::Record;
use crate::sqlite::{
    open_sqlite,
    reader::{list_tables, read_table},
};

/// Field holding the SQLite rowid on fetched records.
pub const ROWID_FIELD: &str = "_rowid";

pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStore {
    /// Open the database file read-only on the blocking pool.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let open_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || open_sqlite(&open_path))
            .await
            .context("SQLite open task panicked")??;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Sqlite(self.path.clone())
    }

    fn validate_collection(&self, collection: &str) -> Result<()> {
        crate::utils::validate_identifier(collection).context("Invalid SQLite table name")
    }

    async fn fetch_records(&self, collection: &str) -> Result<Vec<Record>> {
        let conn = Arc::clone(&self.conn);
        let table = collection.to_string();

        let records = tokio::task::spawn_blocking(move || -> Result<Vec<Record>> {
            let guard = conn
                .lock()
                .map_err(|_| anyhow!("SQLite store connection lock poisoned"))?;
            let Some(conn) = guard.as_ref() else {
                bail!("SQLite store connection is already closed");
            };

            let tables = list_tables(conn)?;
            if !tables.iter().any(|t| t == &table) {
                return Err(MissingCollection {
                    kind: "sqlite",
                    collection: table,
                    available: Some(tables),
                }
                .into());
            }

            let data = read_table(conn, &table)?;
            if data.columns.iter().any(|c| c == ROWID_FIELD) {
                bail!(
                    "Table '{}' has a column named '{}', which clashes with the store identity field",
                    table,
                    ROWID_FIELD
                );
            }

            Ok(data
                .rows
                .into_iter()
                .map(|row| {
                    let mut record = Record::new();
                    record.insert(ROWID_FIELD.to_string(), Value::Number(row.rowid.into()));
                    for (column, value) in data.columns.iter().zip(row.values) {
                        record.insert(column.clone(), value);
                    }
                    record
                })
                .collect())
        })
        .await
        .context("SQLite fetch task panicked")??;

        tracing::debug!(
            "Fetched {} rows from '{}' in {}",
            records.len(),
            collection,
            self.path.display()
        );
        Ok(records)
    }

    async fn close(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("SQLite store connection lock poisoned"))?
            .take();
        if let Some(conn) = conn {
            conn.close()
                .map_err(|(_, e)| e)
                .context("Failed to close SQLite store")?;
        }
        Ok(())
    }
}
