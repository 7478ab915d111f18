//! Command handlers -- one module per subcommand

pub mod config;
pub mod list;
pub mod modules;
pub mod scan;
pub mod status;
pub mod submit;

use std::path::Path;

use centinela_core::config::CentinelaConfig;
use centinela_core::module::ModuleRegistry;
use centinela_engine::Backends;

use crate::error::CliError;

/// Load `centinela.toml` with environment overrides, validated.
pub(crate) async fn load_config(config_path: &Path) -> Result<CentinelaConfig, CliError> {
    CentinelaConfig::load(config_path)
        .await
        .map_err(|e| CliError::Config(format!("{}: {}", config_path.display(), e)))
}

/// Registry of the modules listed in `[modules] enabled`.
pub(crate) fn build_registry(config: &CentinelaConfig) -> Result<ModuleRegistry, CliError> {
    centinela_modules::default_registry(&config.modules)
        .map_err(|e| CliError::Config(format!("failed to build module registry: {}", e)))
}

/// Open the configured backends, refusing the memory store for commands
/// that read state written by another process.
pub(crate) async fn open_persistent(
    config: &CentinelaConfig,
    command: &str,
) -> Result<Backends, CliError> {
    if config.store.backend != "sqlite" {
        return Err(CliError::Config(format!(
            "`{command}` needs store.backend = \"sqlite\"; the memory store does not outlive a process"
        )));
    }
    Ok(Backends::open(config).await?)
}
