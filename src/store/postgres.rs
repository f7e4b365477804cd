// ABOUTME: PostgreSQL store reading whole tables as JSON records via to_jsonb
// ABOUTME: Connects over native-tls and drives the connection on a background task

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;

use super::{MissingCollection, Store, StoreKind};
use crate::engine::Record;
use crate::utils::{quote_ident, validate_identifier};

const DEFAULT_SCHEMA: &str = "public";

pub struct PostgresStore {
    client: Mutex<Option<Client>>,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresStore {
    /// Connect to PostgreSQL. TLS is negotiated according to the URL's `sslmode`.
    pub async fn connect(url: &str) -> Result<Self> {
        let connector = TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(connector);

        let (client, connection) = tokio_postgres::connect(url, tls).await.with_context(|| {
            format!(
                "Failed to connect to PostgreSQL store {}",
                crate::utils::redact_url(url)
            )
        })?;

        let handle = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL store connection error: {}", e);
            }
        });

        Ok(Self {
            client: Mutex::new(Some(client)),
            connection: Mutex::new(Some(handle)),
        })
    }
}

/// Split `schema.table` (or bare `table`, defaulting to `public`) and validate both parts.
pub fn parse_table_name(collection: &str) -> Result<(String, String)> {
    let (schema, table) = match collection.split_once('.') {
        Some((schema, table)) => (schema, table),
        None => (DEFAULT_SCHEMA, collection),
    };
    validate_identifier(schema).context("Invalid schema name")?;
    validate_identifier(table).context("Invalid table name")?;
    Ok((schema.to_string(), table.to_string()))
}

#[async_trait]
impl Store for PostgresStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Postgres
    }

    fn validate_collection(&self, collection: &str) -> Result<()> {
        parse_table_name(collection).map(|_| ())
    }

    async fn fetch_records(&self, collection: &str) -> Result<Vec<Record>> {
        let (schema, table) = parse_table_name(collection)?;
        let guard = self.client.lock().await;
        let Some(client) = guard.as_ref() else {
            bail!("PostgreSQL store connection is already closed");
        };

        // Identifiers are validated above
        let query = format!(
            "SELECT to_jsonb(t) FROM {}.{} t",
            quote_ident(&schema),
            quote_ident(&table)
        );
        let rows = match client.query(&query, &[]).await {
            Ok(rows) => rows,
            Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => {
                return Err(MissingCollection {
                    kind: "postgresql",
                    collection: format!("{}.{}", schema, table),
                    available: None,
                }
                .into());
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("Failed to read {}.{}", schema, table)))
            }
        };

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match row.try_get::<_, Value>(0)? {
                Value::Object(record) => records.push(record),
                other => bail!(
                    "Expected a JSON object per row from {}.{}, got {}",
                    schema,
                    table,
                    other
                ),
            }
        }

        tracing::debug!("Fetched {} rows from {}.{}", records.len(), schema, table);
        Ok(records)
    }

    async fn close(&self) -> Result<()> {
        // Dropping the client ends the connection future
        drop(self.client.lock().await.take());
        if let Some(handle) = self.connection.lock().await.take() {
            handle
                .await
                .context("PostgreSQL connection task panicked")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table_name() {
        assert_eq!(
            parse_table_name("models").unwrap(),
            ("public".to_string(), "models".to_string())
        );
        assert_eq!(
            parse_table_name("catalog.models").unwrap(),
            ("catalog".to_string(), "models".to_string())
        );
    }

    #[test]
    fn test_parse_table_name_rejects_injection() {
        assert!(parse_table_name("models; DROP TABLE models").is_err());
        assert!(parse_table_name("a.b.c").is_err());
        assert!(parse_table_name(".models").is_err());
    }
}
