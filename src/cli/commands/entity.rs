//! `slate get/create/update/delete` - single-entity operations

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::args::GlobalOpts;
use crate::cli::helpers;
use crate::core::schema::EntityKind;
use crate::core::value::{normalize_json, record_id};
use crate::pages;
use crate::remap;

#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Entity type
    pub entity_type: String,
    /// Entity id
    pub id: i64,
}

pub fn get(args: GetArgs, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    let kind = EntityKind::from_name(&args.entity_type).into_diagnostic()?;
    match pages::get_entity(&store, kind, args.id).into_diagnostic()? {
        Some(record) => helpers::print_json(&record),
        None => {
            println!("{} {} {} not found", style("✗").red(), kind, args.id);
            Ok(())
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    /// Entity type
    pub entity_type: String,

    /// Field values as a JSON object
    #[arg(long)]
    pub data: String,
}

pub fn create(args: CreateArgs, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    let kind = EntityKind::from_name(&args.entity_type).into_diagnostic()?;

    let payload = normalize_json(&helpers::parse_json(&args.data, "data")?);
    let data = payload
        .as_object()
        .ok_or_else(|| miette::miette!("--data must be a JSON object"))?;

    let fields = pages::default_field_list(kind);
    let mut record = store.create(kind, data, Some(&fields)).into_diagnostic()?;
    remap::adjust_one(&mut record);

    if !global.quiet {
        println!(
            "{} Created {} {}",
            style("✓").green(),
            kind,
            record_id(&record).unwrap_or_default()
        );
    }
    helpers::print_json(&record)
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Entity type
    pub entity_type: String,
    /// Entity id
    pub id: i64,

    /// Fields to change as a JSON object
    #[arg(long)]
    pub data: String,
}

pub fn update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    let kind = EntityKind::from_name(&args.entity_type).into_diagnostic()?;

    let payload = normalize_json(&helpers::parse_json(&args.data, "data")?);
    let data = payload
        .as_object()
        .ok_or_else(|| miette::miette!("--data must be a JSON object"))?;

    store.update(kind, args.id, data).into_diagnostic()?;
    match pages::get_entity(&store, kind, args.id).into_diagnostic()? {
        Some(record) => {
            if !global.quiet {
                println!("{} Updated {} {}", style("✓").green(), kind, args.id);
            }
            helpers::print_json(&record)
        }
        None => Ok(()),
    }
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Entity type
    pub entity_type: String,
    /// Entity id
    pub id: i64,
}

pub fn delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    let kind = EntityKind::from_name(&args.entity_type).into_diagnostic()?;
    let removed = store.delete(kind, args.id).into_diagnostic()?;
    if removed {
        println!("{} Deleted {} {}", style("✓").green(), kind, args.id);
    } else {
        println!("{} {} {} not found", style("✗").red(), kind, args.id);
    }
    Ok(())
}
