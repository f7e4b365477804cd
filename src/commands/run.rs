// ABOUTME: Run command reconciling every selected collection against the store
// ABOUTME: Each collection is extracted, deduplicated, diffed, and reported in isolation

use anyhow::{bail, Context, Result};
use futures::future::LocalBoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::{CollectionConfig, ReconcileConfig, StoreSettings};
use crate::engine::{dedupe, reconcile, ChangeCounts};
use crate::extract::{combine_extractions, extract_collection};
use crate::report::Reporter;
use crate::store::{connect_store, fetch_with_retry, with_store, Store, StoreKind};
use crate::utils::redact_url;

/// Options resolved from the CLI on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Store URL after applying CLI/config/state precedence
    pub store_url: String,
    /// Only run these collections; empty runs all of them
    pub collections: Vec<String>,
    pub output_dir: Option<PathBuf>,
    pub parallelism: Option<usize>,
    pub show_progress: bool,
}

/// Opens the store connection used by one collection.
type Connector = for<'a> fn(&'a str) -> LocalBoxFuture<'a, Result<Box<dyn Store>>>;

fn connect(url: &str) -> LocalBoxFuture<'_, Result<Box<dyn Store>>> {
    connect_store(url).boxed_local()
}

/// Shared, read-only inputs for every collection in a run.
struct RunContext {
    store_url: String,
    store_kind: StoreKind,
    store_settings: StoreSettings,
    reporter: Reporter,
    connector: Connector,
}

/// Outcome of one successfully reconciled collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub source_records: usize,
    pub unique_records: usize,
    pub duplicates: usize,
    pub store_records: usize,
    pub counts: ChangeCounts,
    pub report_dir: PathBuf,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionFailure {
    pub name: String,
    pub error: String,
}

/// Results of a run, in config order.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub succeeded: Vec<CollectionSummary>,
    pub failed: Vec<CollectionFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn print(&self) {
        println!();
        println!("Run {}", self.run_id);
        for summary in &self.succeeded {
            println!(
                "  ✓ {}: {} added, {} deleted, {} updated, {} matched ({} duplicates dropped)",
                summary.name,
                summary.counts.additions,
                summary.counts.deletions,
                summary.counts.updates,
                summary.counts.matches,
                summary.duplicates
            );
        }
        for failure in &self.failed {
            println!("  ✗ {}: {}", failure.name, failure.error);
        }
        println!(
            "{} of {} collections reconciled",
            self.succeeded.len(),
            self.total()
        );
    }
}

/// Select the collections a run covers, keeping config order.
pub fn select_collections<'a>(
    config: &'a ReconcileConfig,
    names: &[String],
) -> Result<Vec<&'a CollectionConfig>> {
    if names.is_empty() {
        return Ok(config.collections.iter().collect());
    }
    for name in names {
        if config.collection(name).is_none() {
            let known: Vec<&str> = config.collections.iter().map(|c| c.name.as_str()).collect();
            bail!(
                "Unknown collection '{}'. Configured collections: {}",
                name,
                known.join(", ")
            );
        }
    }
    Ok(config
        .collections
        .iter()
        .filter(|c| names.contains(&c.name))
        .collect())
}

/// Reconcile the selected collections.
///
/// A failing collection is logged and recorded in the summary; it never stops
/// the remaining collections. Returns `Err` only for run-level problems such
/// as an unusable store URL or an unknown collection name.
pub async fn run(config: &ReconcileConfig, options: RunOptions) -> Result<RunSummary> {
    run_with_connector(config, options, connect).await
}

async fn run_with_connector(
    config: &ReconcileConfig,
    options: RunOptions,
    connector: Connector,
) -> Result<RunSummary> {
    let selected = select_collections(config, &options.collections)?;
    let store_kind = StoreKind::detect(&options.store_url)?;
    let parallelism = options.parallelism.unwrap_or(config.output.parallelism);
    if parallelism == 0 {
        bail!("Parallelism must be at least 1");
    }

    let output_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output.dir.clone());
    let ctx = RunContext {
        store_url: options.store_url.clone(),
        store_kind,
        store_settings: config.store.clone(),
        reporter: Reporter::new(output_dir),
        connector,
    };

    tracing::info!(
        "Reconciling {} collection(s) against {} store {} (run {})",
        selected.len(),
        ctx.store_kind,
        redact_url(&ctx.store_url),
        ctx.reporter.run_id()
    );

    let progress = if options.show_progress {
        let bar = ProgressBar::new(selected.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} [{bar:40.cyan/blue}] {pos}/{len}")
                .context("Invalid progress bar template")?
                .progress_chars("█▓▒░"),
        );
        bar.set_message("Reconciling");
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    } else {
        ProgressBar::hidden()
    };

    let mut results: Vec<(usize, String, Result<CollectionSummary>)> =
        stream::iter(selected.into_iter().enumerate())
            .map(|(idx, collection)| {
                let ctx = &ctx;
                let progress = &progress;
                async move {
                    let result = run_collection(collection, ctx).await;
                    progress.inc(1);
                    (idx, collection.name.clone(), result)
                }
            })
            .buffer_unordered(parallelism)
            .collect()
            .await;
    progress.finish_and_clear();
    results.sort_by_key(|(idx, _, _)| *idx);

    let mut summary = RunSummary {
        run_id: ctx.reporter.run_id(),
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for (_, name, result) in results {
        match result {
            Ok(collection_summary) => summary.succeeded.push(collection_summary),
            Err(e) => {
                tracing::error!("Collection '{}' failed, no report written: {:?}", name, e);
                match ctx.reporter.discard_collection(&name).await {
                    Ok(0) => {}
                    Ok(n) => tracing::warn!(
                        "Removed {} report file(s) left for '{}' by an earlier run",
                        n,
                        name
                    ),
                    Err(discard_err) => tracing::warn!(
                        "Could not remove earlier reports for '{}': {:?}",
                        name,
                        discard_err
                    ),
                }
                summary.failed.push(CollectionFailure {
                    name,
                    error: format!("{:#}", e),
                });
            }
        }
    }

    Ok(summary)
}

/// Reconcile one collection end to end.
///
/// Extraction runs on the blocking pool. The store connection is opened for
/// this collection only and closed on every exit path. Reports are written
/// only after reconciliation succeeds.
async fn run_collection(
    collection: &CollectionConfig,
    ctx: &RunContext,
) -> Result<CollectionSummary> {
    let start = Instant::now();
    tracing::info!("Reconciling collection '{}'", collection.name);

    let to_extract = collection.clone();
    let extractions = tokio::task::spawn_blocking(move || extract_collection(&to_extract))
        .await
        .context("Extraction task panicked")?;
    let source = combine_extractions(extractions)?;
    let source_records = source.len();

    let strategy = collection.dedup_strategy();
    let normalizer = collection.normalizer();
    let deduped = dedupe(source, &strategy, &normalizer)?;
    if !deduped.duplicates.is_empty() {
        tracing::info!(
            "Collection '{}': dropped {} duplicate source records across {} keys",
            collection.name,
            deduped.duplicate_count(),
            deduped.duplicates.len()
        );
    }

    let identity_fields = collection
        .resolve_identity_fields(&ctx.store_settings, ctx.store_kind.default_identity_fields());
    let compare_spec = collection.compare_spec(identity_fields);

    let store = (ctx.connector)(&ctx.store_url).await?;
    let (store_records, changes) = with_store(store, |store| {
        let unique = &deduped.unique;
        let compare_spec = &compare_spec;
        async move {
            let snapshot =
                fetch_with_retry(store.as_ref(), &collection.store_collection, &ctx.store_settings)
                    .await?;
            let changes = reconcile(unique, &snapshot, compare_spec)?;
            Ok::<_, anyhow::Error>((snapshot.len(), changes))
        }
    })
    .await?;

    let unique_records = deduped.unique.len();
    let duplicates = deduped.duplicate_count();
    let report = deduped.into_report(&strategy);
    ctx.reporter
        .write_collection(&collection.name, &report, &changes)
        .await?;

    tracing::info!(
        "Collection '{}': {} to add, {} to delete, {} to update, {} in sync",
        collection.name,
        changes.counts.additions,
        changes.counts.deletions,
        changes.counts.updates,
        changes.counts.matches
    );

    Ok(CollectionSummary {
        name: collection.name.clone(),
        source_records,
        unique_records,
        duplicates,
        store_records,
        counts: changes.counts,
        report_dir: ctx.reporter.collection_dir(&collection.name),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}
