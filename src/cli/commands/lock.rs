//! `slate lock` - Subproject edit-lock operations

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::cli::helpers;
use crate::lock;

#[derive(Subcommand, Debug)]
pub enum LockCommands {
    /// Try to take the edit lock
    Acquire {
        subproject_id: i64,
        user_id: i64,
    },

    /// Refresh the lock timestamp
    Heartbeat {
        subproject_id: i64,
        user_id: i64,
    },

    /// Give the lock back
    Release {
        subproject_id: i64,
        user_id: i64,
    },
}

pub fn run(cmd: LockCommands, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    let response = match cmd {
        LockCommands::Acquire { subproject_id, user_id } => {
            lock::acquire(&store, subproject_id, user_id).into_diagnostic()?
        }
        LockCommands::Heartbeat { subproject_id, user_id } => {
            lock::heartbeat(&store, subproject_id, user_id).into_diagnostic()?
        }
        LockCommands::Release { subproject_id, user_id } => {
            lock::release(&store, subproject_id, user_id).into_diagnostic()?
        }
    };

    if !global.quiet {
        if response.success {
            println!("{} ok", style("✓").green());
        } else if let Some(ref holder) = response.editing_user {
            println!(
                "{} locked by {} since {}",
                style("✗").red(),
                holder.name,
                response.last_edit.as_deref().unwrap_or("unknown")
            );
        } else {
            println!("{} refused", style("✗").red());
        }
    }
    helpers::print_json(&response)
}
