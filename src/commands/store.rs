// ABOUTME: `store` subcommand managing the saved default store URL
// ABOUTME: set/unset/get read and write the persisted CLI state

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::state;
use crate::store::StoreKind;
use crate::utils::redact_url;

#[derive(Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    command: StoreCommands,
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Save the default store URL used when neither --store nor the config sets one
    Set {
        /// PostgreSQL, MongoDB, or SQLite store URL
        url: String,
    },
    /// Forget the saved store URL
    Unset,
    /// Show the saved store URL (password masked)
    Get,
}

pub async fn command(args: StoreArgs) -> Result<()> {
    match args.command {
        StoreCommands::Set { url } => {
            let kind = StoreKind::detect(&url)?;
            let mut state = state::load().context("Failed to load state")?;
            state.store_url = Some(url.clone());
            state::save(&state).context("Failed to save state")?;
            println!("Store URL set to: {} ({})", redact_url(&url), kind);
        }
        StoreCommands::Unset => {
            let mut state = state::load().context("Failed to load state")?;
            state.store_url = None;
            state::save(&state).context("Failed to save state")?;
            println!("Store URL unset.");
        }
        StoreCommands::Get => {
            let state = state::load().context("Failed to load state")?;
            match state.store_url {
                Some(url) => println!("Current store URL: {}", redact_url(&url)),
                None => println!("Store URL is not set."),
            }
        }
    }
    Ok(())
}
