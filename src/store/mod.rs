// ABOUTME: Store collaborators providing read-only snapshots of the persisted collection
// ABOUTME: One implementation per store kind, selected once from the store URL

pub mod mongodb;
pub mod postgres;
pub mod sqlite;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::StoreSettings;
use crate::engine::Record;

/// Storage engines a snapshot can be fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    Postgres,
    MongoDb,
    Sqlite(PathBuf),
}

impl StoreKind {
    /// Detect the store kind from a connection URL or SQLite file path.
    ///
    /// # Examples
    ///
    /// ```
    /// # use collection_reconciler::store::StoreKind;
    /// assert_eq!(StoreKind::detect("postgresql://localhost/catalog").unwrap(), StoreKind::Postgres);
    /// assert_eq!(StoreKind::detect("mongodb+srv://cluster0/catalog").unwrap(), StoreKind::MongoDb);
    /// assert_eq!(
    ///     StoreKind::detect("sqlite:///var/data/store.db").unwrap(),
    ///     StoreKind::Sqlite("/var/data/store.db".into())
    /// );
    /// assert!(StoreKind::detect("mysql://localhost/catalog").is_err());
    /// ```
    pub fn detect(url: &str) -> Result<Self> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            return Ok(StoreKind::Postgres);
        }
        if lower.starts_with("mongodb://") || lower.starts_with("mongodb+srv://") {
            return Ok(StoreKind::MongoDb);
        }
        if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                bail!("sqlite:// store URL is missing a file path");
            }
            return Ok(StoreKind::Sqlite(PathBuf::from(path)));
        }
        if [".db", ".sqlite", ".sqlite3"]
            .iter()
            .any(|ext| lower.ends_with(ext))
            && !lower.contains("://")
        {
            return Ok(StoreKind::Sqlite(PathBuf::from(url)));
        }

        bail!(
            "Unsupported store URL '{}'. Expected postgresql://, mongodb://, mongodb+srv://, \
             sqlite://<path>, or a path to a .db/.sqlite/.sqlite3 file",
            crate::utils::redact_url(url)
        )
    }

    /// Fields the store attaches purely as storage-layer identifiers.
    pub fn default_identity_fields(&self) -> &'static [&'static str] {
        match self {
            StoreKind::Postgres => &["id"],
            StoreKind::MongoDb => &["_id"],
            StoreKind::Sqlite(_) => &[sqlite::ROWID_FIELD],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::Postgres => "postgresql",
            StoreKind::MongoDb => "mongodb",
            StoreKind::Sqlite(_) => "sqlite",
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The store has no collection by the requested name.
///
/// Fetches that fail this way are not retried.
#[derive(Debug, thiserror::Error)]
#[error("{kind} store has no collection '{collection}'{}", available_hint(.available))]
pub struct MissingCollection {
    pub kind: &'static str,
    pub collection: String,
    /// Collections that do exist, when the store can list them cheaply
    pub available: Option<Vec<String>>,
}

fn available_hint(available: &Option<Vec<String>>) -> String {
    match available {
        Some(names) if names.is_empty() => ". Available tables: (none)".to_string(),
        Some(names) => format!(". Available tables: {}", names.join(", ")),
        None => String::new(),
    }
}

/// A read-only view of the persisted collections.
///
/// Implementations hold one live connection. Callers release it through
/// [`with_store`], which calls [`Store::close`] on every exit path.
#[async_trait]
pub trait Store: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Reject a collection name this store could never read.
    fn validate_collection(&self, _collection: &str) -> Result<()> {
        Ok(())
    }

    /// Fetch every record of a collection. Records may carry store-assigned
    /// identity fields; the engine strips them before comparison.
    async fn fetch_records(&self, collection: &str) -> Result<Vec<Record>>;

    /// Release the underlying connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Open a store connection for the given URL.
pub async fn connect_store(url: &str) -> Result<Box<dyn Store>> {
    let kind = StoreKind::detect(url)?;
    tracing::debug!("Connecting to {} store {}", kind, crate::utils::redact_url(url));

    let store: Box<dyn Store> = match kind {
        StoreKind::Postgres => Box::new(postgres::PostgresStore::connect(url).await?),
        StoreKind::MongoDb => Box::new(mongodb::MongoStore::connect(url).await?),
        StoreKind::Sqlite(path) => Box::new(sqlite::SqliteStore::open(path).await?),
    };
    Ok(store)
}

/// Run `operation` against a store and close it afterwards, whatever the outcome.
///
/// A failure to close is logged and does not mask the operation's own result.
pub async fn with_store<F, Fut, T>(store: Box<dyn Store>, operation: F) -> Result<T>
where
    F: FnOnce(Arc<dyn Store>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let store: Arc<dyn Store> = Arc::from(store);
    let result = operation(Arc::clone(&store)).await;

    if let Err(e) = store.close().await {
        tracing::warn!("Failed to close {} store connection: {:?}", store.kind(), e);
    }

    result
}

/// Fetch a collection snapshot, retrying transient failures with backoff.
pub async fn fetch_with_retry(
    store: &dyn Store,
    collection: &str,
    settings: &StoreSettings,
) -> Result<Vec<Record>> {
    store
        .validate_collection(collection)
        .with_context(|| format!("Invalid store collection '{}'", collection))?;

    let what = format!("Fetching '{}' from {} store", collection, store.kind());
    crate::utils::retry_with_backoff(
        || store.fetch_records(collection),
        |e| e.downcast_ref::<MissingCollection>().is_none(),
        settings.retries,
        Duration::from_millis(settings.retry_delay_ms),
        &what,
    )
    .await
    .with_context(|| format!("Failed to fetch store collection '{}'", collection))
}
