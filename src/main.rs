//! flowstore CLI entry point.

use clap::Parser;
use flowstore::cli::commands;
use flowstore::cli::{Cli, Commands};
use flowstore::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    init_tracing(cli.verbose, cli.quiet);

    // --json, or stdout is not a terminal
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,tokio_postgres=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    if !cli.command.needs_database() {
        return match &cli.command {
            Commands::Completions { shell } => commands::completions::execute(shell),
            _ => commands::version::execute(json),
        };
    }

    let config = cli.database_config()?;
    let db = commands::open_database(&config)?;

    match &cli.command {
        Commands::Migrate => commands::migrate::execute(&db, &config, json),
        Commands::Task { command } => commands::task::execute(&db, command, json),
        Commands::Phase { command } => commands::phase::execute(&db, command, json),
        Commands::Event { command } => commands::event::execute(&db, command, json),
        Commands::Transcript { command } => commands::transcript::execute(&db, command, json),
        Commands::Dashboard { days, initiatives } => {
            commands::dashboard::execute(&db, *days, *initiatives, json)
        }
        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
