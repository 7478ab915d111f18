//! CLI argument definitions for centinela-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use centinela_core::config::CentinelaConfig;

/// Centinela scan orchestration daemon.
///
/// Runs the per-lane worker pools against the configured status store
/// and task queue, recovers orphaned executions on start and periodically
/// reconciles scans that were left running.
#[derive(Parser, Debug)]
#[command(name = "centinela-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to centinela.toml configuration file.
    #[arg(short, long, default_value = "/etc/centinela/centinela.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut CentinelaConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file.clone_from(pid_file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_system_config() {
        let cli = DaemonCli::parse_from(["centinela-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/centinela/centinela.toml"));
        assert!(!cli.validate);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn overrides_take_precedence() {
        let cli = DaemonCli::parse_from([
            "centinela-daemon",
            "--config",
            "/tmp/c.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--pid-file",
            "",
            "--validate",
        ]);
        let mut config = CentinelaConfig::default();
        cli.apply_overrides(&mut config);

        assert!(cli.validate);
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "pretty");
        assert!(config.general.pid_file.is_empty());
    }

    #[test]
    fn absent_overrides_keep_config_values() {
        let cli = DaemonCli::parse_from(["centinela-daemon"]);
        let mut config = CentinelaConfig::default();
        config.general.log_level = "warn".to_owned();
        cli.apply_overrides(&mut config);
        assert_eq!(config.general.log_level, "warn");
        assert_eq!(config.general.log_format, "json");
    }
}
