//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use centinela_engine::ScanRequest;

/// Centinela -- reconnaissance scan orchestration.
///
/// Use `centinela <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "centinela", version, about, long_about = None)]
pub struct Cli {
    /// Path to the centinela.toml configuration file.
    #[arg(short, long, default_value = "centinela.toml")]
    pub config: PathBuf,

    /// Log level for diagnostics on stderr (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scan in-process and wait for the report.
    Scan(ScanArgs),

    /// Persist and enqueue a scan for a daemon sharing the database.
    Submit(SubmitArgs),

    /// Show the report of one scan.
    Status(StatusArgs),

    /// List scans.
    List(ListArgs),

    /// List the modules enabled by the configuration.
    Modules,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- scan / submit ----

/// Target and module selection shared by `scan` and `submit`.
#[derive(Args, Debug)]
pub struct TargetArgs {
    /// Domain name or IP address to scan.
    pub target: String,

    /// Modules to run, comma separated (e.g. dns,whois,nmap).
    #[arg(short, long, value_delimiter = ',', required = true)]
    pub modules: Vec<String>,

    /// Owner recorded on the scan.
    #[arg(long, default_value = "cli")]
    pub owner: String,
}

impl TargetArgs {
    pub fn to_request(&self) -> ScanRequest {
        ScanRequest::new(
            self.owner.as_str(),
            self.target.as_str(),
            self.modules.iter().map(String::as_str),
        )
    }
}

/// Submit a scan and run it with embedded workers until it settles.
#[derive(Args, Debug)]
pub struct ScanArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Give up waiting after this many seconds.
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,
}

impl ScanArgs {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Persist and enqueue a scan without running it.
#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

// ---- status / list ----

/// Show a scan report.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Scan ID returned by `submit` or `scan`.
    pub scan_id: String,

    /// Wait until the scan settles before printing.
    #[arg(short, long)]
    pub wait: bool,

    /// Maximum wait in seconds (with --wait).
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,

    /// Include module result documents in text output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// List scans, newest last.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status (pending, running, completed, error).
    #[arg(long)]
    pub status: Option<String>,
}

// ---- config ----

/// Manage centinela configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only a specific section (general, store, queue, worker, modules, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}
