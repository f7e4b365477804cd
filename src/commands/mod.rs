// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports run, validate, and store commands

pub mod run;
pub mod store;
pub mod validate;

pub use run::{run, RunOptions, RunSummary};
pub use store::command as store;
pub use validate::validate;
