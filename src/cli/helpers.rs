//! Shared helpers for CLI commands

use std::path::PathBuf;

use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::core::Config;
use crate::store::Store;

/// Resolve the database path from flags, then config, then the data dir
pub fn database_path(global: &GlobalOpts) -> PathBuf {
    global.db.clone().unwrap_or_else(|| Config::load().database_path())
}

/// Open the store the command should work against
pub fn open_store(global: &GlobalOpts) -> Result<Store> {
    let path = database_path(global);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).into_diagnostic()?;
        }
    }
    Store::open(&path).into_diagnostic()
}

/// Parse a JSON argument (filters, payloads) with a readable error
pub fn parse_json(raw: &str, what: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|e| miette::miette!("invalid {} JSON: {}", what, e))
}

/// Pretty-print any serializable value to stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
