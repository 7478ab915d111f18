use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use centinela_cli::cli::{Cli, Commands};
use centinela_cli::commands;
use centinela_cli::error::CliError;
use centinela_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr so stdout stays parseable in JSON mode.
    let level = cli.log_level.as_deref().unwrap_or("warn");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let config_path = cli.config.as_path();

    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, config_path, &writer).await,
        Commands::Submit(args) => commands::submit::execute(args, config_path, &writer).await,
        Commands::Status(args) => commands::status::execute(args, config_path, &writer).await,
        Commands::List(args) => commands::list::execute(args, config_path, &writer).await,
        Commands::Modules => commands::modules::execute(config_path, &writer).await,
        Commands::Config(args) => commands::config::execute(args, config_path, &writer).await,
    }
}
