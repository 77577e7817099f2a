//! `slate page` - composite page bundles

use chrono::NaiveDate;
use clap::Subcommand;
use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::cli::helpers;
use crate::core::Config;
use crate::pages;

#[derive(Subcommand, Debug)]
pub enum PageCommands {
    /// Everything one project view needs
    Project {
        /// Subproject id
        id: i64,
    },

    /// All subprojects and phases
    Distribute,

    /// People, steps, work categories and the current user
    Basic {
        /// Current user id (default: from config)
        #[arg(long)]
        user: Option<i64>,
    },

    /// Tasks and workloads overlapping a date window
    Assignment {
        /// Window start (YYYY-MM-DD)
        start: NaiveDate,
        /// Window end (YYYY-MM-DD)
        end: NaiveDate,
    },

    /// Merged startup snapshot
    InitLoad {
        /// Initially selected subproject
        #[arg(long)]
        project: Option<i64>,

        /// Initially selected people
        #[arg(long, value_delimiter = ',')]
        people: Vec<i64>,

        /// Current user id (default: from config)
        #[arg(long)]
        user: Option<i64>,
    },
}

pub fn run(cmd: PageCommands, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    match cmd {
        PageCommands::Project { id } => {
            helpers::print_json(&pages::fetch_project_page(&store, id).into_diagnostic()?)
        }
        PageCommands::Distribute => {
            helpers::print_json(&pages::fetch_distribute_page(&store).into_diagnostic()?)
        }
        PageCommands::Basic { user } => {
            let user = user.or_else(|| Config::load().current_user);
            helpers::print_json(&pages::fetch_basic_data(&store, user).into_diagnostic()?)
        }
        PageCommands::Assignment { start, end } => helpers::print_json(
            &pages::fetch_assignment_page(&store, start, end).into_diagnostic()?,
        ),
        PageCommands::InitLoad { project, people, user } => {
            let user = user.or_else(|| Config::load().current_user);
            helpers::print_json(
                &pages::init_load(&store, project, &people, user).into_diagnostic()?,
            )
        }
    }
}
