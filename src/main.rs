// ABOUTME: CLI entry point for collection-reconciler
// ABOUTME: Parses commands and routes to appropriate handlers

use anyhow::Context;
use clap::{Parser, Subcommand};
use collection_reconciler::commands;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "collection-reconciler")]
#[command(
    about = "Reconcile records extracted from tabular sources against a persistent store",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile configured collections and write change-set reports
    Run {
        /// Path to the reconciliation config (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Store URL (overrides [store].url and the saved store URL)
        #[arg(long, env = "RECONCILER_STORE_URL")]
        store: Option<String>,
        /// Only reconcile these collections (repeatable)
        #[arg(long = "collection")]
        collections: Vec<String>,
        /// Report output directory (overrides [output].dir)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Number of collections to reconcile concurrently (overrides [output].parallelism)
        #[arg(long)]
        parallel: Option<usize>,
        /// Hide the progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Check a reconciliation config without contacting the store
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
    /// Manage the saved default store URL
    Store {
        #[command(flatten)]
        args: commands::store::StoreArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // We need to parse CLI args early to get the log level
    let cli = Cli::parse();

    // Initialize logging with the specified level
    // RUST_LOG env var takes precedence if set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Run {
            config,
            store,
            collections,
            output,
            parallel,
            no_progress,
        } => {
            let config = collection_reconciler::config::ReconcileConfig::load(&config)?;
            let state = collection_reconciler::state::load()?;
            let store_url = collection_reconciler::resolve_store_url(
                store.as_deref(),
                config.store.url.as_deref(),
                state.store_url.as_deref(),
            )?;

            let options = commands::RunOptions {
                store_url,
                collections,
                output_dir: output,
                parallelism: parallel,
                show_progress: !no_progress,
            };
            let summary = commands::run(&config, options)
                .await
                .context("Reconciliation run failed")?;
            summary.print();

            if !summary.is_success() {
                anyhow::bail!(
                    "{} of {} collections failed",
                    summary.failed.len(),
                    summary.total()
                );
            }
            Ok(())
        }
        Commands::Validate { config } => {
            commands::validate(&config)?;
            Ok(())
        }
        Commands::Store { args } => commands::store(args).await,
    }
}
