//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs,
    entity::{CreateArgs, DeleteArgs, GetArgs, UpdateArgs},
    find::FindArgs,
    init::InitArgs,
    lock::LockCommands,
    page::PageCommands,
};

#[derive(Parser)]
#[command(name = "slate")]
#[command(author, version, about = "Slate production tracker")]
#[command(
    long_about = "Production-tracking data layer for studio scheduling: a generic entity query engine over the Subproject → Phase → Asset → Task → Workload hierarchy."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Tracking database (default: from config, else the user data dir)
    #[arg(long, global = true, env = "SLATE_DB")]
    pub db: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create an empty tracking database
    Init(InitArgs),

    /// Query entities with filters, projection, ordering and pagination
    Find(FindArgs),

    /// Fetch one entity by id
    Get(GetArgs),

    /// Create an entity from a JSON payload
    Create(CreateArgs),

    /// Update named fields of an entity
    Update(UpdateArgs),

    /// Delete an entity (cascades down the hierarchy)
    Delete(DeleteArgs),

    /// Fetch a composite page bundle
    #[command(subcommand)]
    Page(PageCommands),

    /// Subproject edit-lock operations
    #[command(subcommand)]
    Lock(LockCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}
