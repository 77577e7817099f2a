use clap::Parser;
use miette::Result;
use slate::cli::{Cli, Commands};

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Install miette's fancy error handler
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;

    match cli.command {
        Commands::Init(args) => slate::cli::commands::init::run(args, &global),
        Commands::Find(args) => slate::cli::commands::find::run(args, &global),
        Commands::Get(args) => slate::cli::commands::entity::get(args, &global),
        Commands::Create(args) => slate::cli::commands::entity::create(args, &global),
        Commands::Update(args) => slate::cli::commands::entity::update(args, &global),
        Commands::Delete(args) => slate::cli::commands::entity::delete(args, &global),
        Commands::Page(cmd) => slate::cli::commands::page::run(cmd, &global),
        Commands::Lock(cmd) => slate::cli::commands::lock::run(cmd, &global),
        Commands::Completions(args) => slate::cli::commands::completions::run(args),
    }
}
