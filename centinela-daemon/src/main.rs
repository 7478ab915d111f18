use anyhow::Result;
use clap::Parser;

use centinela_core::config::CentinelaConfig;
use centinela_daemon::cli::DaemonCli;
use centinela_daemon::logging;
use centinela_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = CentinelaConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "centinela-daemon starting"
    );

    let orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await
}
