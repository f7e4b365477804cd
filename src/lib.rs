// ABOUTME: Library root for collection-reconciler
// ABOUTME: Pure reconciliation engine plus the extract, store, and report collaborators around it

pub mod commands;
pub mod config;
pub mod engine;
pub mod extract;
pub mod report;
pub mod sqlite;
pub mod state;
pub mod store;
pub mod utils;

/// Resolve the store URL: explicit flag, then config file, then saved state.
///
/// # Examples
///
/// ```
/// # use collection_reconciler::resolve_store_url;
/// let url = resolve_store_url(None, Some("sqlite://store.db"), Some("postgresql://saved/db"));
/// assert_eq!(url.unwrap(), "sqlite://store.db");
/// assert!(resolve_store_url(None, None, None).is_err());
/// ```
pub fn resolve_store_url(
    cli: Option<&str>,
    config: Option<&str>,
    saved: Option<&str>,
) -> anyhow::Result<String> {
    cli.or(config).or(saved).map(str::to_string).ok_or_else(|| {
        anyhow::anyhow!(
            "Store URL not provided. Use `--store`, set [store].url in the config, \
             or run `collection-reconciler store set <url>`."
        )
    })
}
