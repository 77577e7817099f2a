//! `slate init` - create an empty tracking database

use console::style;
use miette::Result;

use crate::cli::args::GlobalOpts;
use crate::cli::helpers;

#[derive(clap::Args, Debug)]
pub struct InitArgs {}

pub fn run(_args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let path = helpers::database_path(global);
    let existed = path.exists();
    helpers::open_store(global)?;

    if !global.quiet {
        if existed {
            println!(
                "{} Database already initialized at {}",
                style("✓").green(),
                path.display()
            );
        } else {
            println!(
                "{} Initialized tracking database at {}",
                style("✓").green(),
                path.display()
            );
        }
    }
    Ok(())
}
