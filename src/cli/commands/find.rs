//! `slate find` - query entities through the generic engine

use miette::{IntoDiagnostic, Result};
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::args::{GlobalOpts, OutputFormat};
use crate::cli::helpers;
use crate::core::schema::EntityKind;
use crate::core::value::Record;
use crate::store::{Filter, FindOptions, GroupOp, OrderSpec};

#[derive(clap::Args, Debug)]
pub struct FindArgs {
    /// Entity type (e.g. Task, Subproject, PersonWorkload)
    pub entity_type: String,

    /// Filter list as JSON, e.g. '[["status", "ip"], ["asset.phase.subproject", "is", 3]]'
    #[arg(long, default_value = "[]")]
    pub filters: String,

    /// Fields to project (dotted paths allowed); default projects everything
    #[arg(long, value_delimiter = ',')]
    pub fields: Option<Vec<String>>,

    /// Ordering keys, '-' prefix for descending (e.g. -start_date)
    #[arg(long, value_delimiter = ',')]
    pub order: Vec<String>,

    /// Combine top-level filters with OR instead of AND
    #[arg(long)]
    pub any: bool,

    /// Page size; 0 returns everything
    #[arg(long, default_value_t = 0)]
    pub limit: u32,

    /// 1-indexed page, only meaningful with --limit
    #[arg(long, default_value_t = 0)]
    pub page: u32,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,
}

pub fn run(args: FindArgs, global: &GlobalOpts) -> Result<()> {
    let store = helpers::open_store(global)?;
    let kind = EntityKind::from_name(&args.entity_type).into_diagnostic()?;

    let filters_json = helpers::parse_json(&args.filters, "filter")?;
    let filters = Filter::parse_list(&filters_json).into_diagnostic()?;

    let order = args
        .order
        .iter()
        .map(|o| OrderSpec::parse(&serde_json::Value::String(o.clone())))
        .collect::<std::result::Result<Vec<_>, _>>()
        .into_diagnostic()?;

    let opts = FindOptions {
        fields: args.fields,
        order,
        filter_operator: if args.any { GroupOp::Any } else { GroupOp::All },
        limit: args.limit,
        page: args.page,
    };

    let records = store.find(kind, &filters, &opts).into_diagnostic()?;

    match args.format {
        OutputFormat::Json => helpers::print_json(&records)?,
        OutputFormat::Table => print_table(&records),
    }
    Ok(())
}

fn print_table(records: &[Record]) {
    if records.is_empty() {
        println!("(no matches)");
        return;
    }

    // column order follows the first record's keys
    let columns: Vec<&String> = records[0].keys().collect();
    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.as_str()));
    for record in records {
        builder.push_record(
            columns
                .iter()
                .map(|c| record.get(*c).map(|v| v.display()).unwrap_or_default()),
        );
    }
    let mut table = builder.build();
    table.with(Style::sharp());
    println!("{table}");
}
