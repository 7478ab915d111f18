//! `centinela status` command handler

use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use centinela_core::store::StatusStore;
use centinela_core::types::{ExecutionStatus, ModuleExecution, ScanId};
use centinela_engine::{Backends, ScanOutcome, ScanReport, wait_until_settled};

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
pub async fn execute(
    args: StatusArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let scan_id = ScanId::from_str(&args.scan_id)
        .map_err(|e| CliError::Command(format!("invalid scan id '{}': {}", args.scan_id, e)))?;

    let config = super::load_config(config_path).await?;
    let backends = super::open_persistent(&config, "status").await?;
    let wait = args
        .wait
        .then(|| (config.queue.poll_interval(), Duration::from_secs(args.timeout_secs)));

    let report = match &backends {
        Backends::Memory { store, .. } => load(store.as_ref(), scan_id, wait).await?,
        Backends::SqliteStore { store, .. } => load(store.as_ref(), scan_id, wait).await?,
        Backends::Sqlite { store, .. } => load(store.as_ref(), scan_id, wait).await?,
    };

    writer.render(&ReportView::new(&report, args.verbose))
}

async fn load<S: StatusStore>(
    store: &S,
    scan_id: ScanId,
    wait: Option<(Duration, Duration)>,
) -> Result<ScanReport, CliError> {
    let report = match wait {
        Some((poll, timeout)) => wait_until_settled(store, scan_id, poll, timeout).await?,
        None => ScanReport::load(store, scan_id).await?,
    };
    Ok(report)
}

/// A scan report as printed by `scan` and `status`.
#[derive(Serialize)]
pub struct ReportView<'a> {
    #[serde(flatten)]
    pub report: &'a ScanReport,
    /// Print result documents in text mode.
    #[serde(skip)]
    pub verbose: bool,
}

impl<'a> ReportView<'a> {
    pub fn new(report: &'a ScanReport, verbose: bool) -> Self {
        Self { report, verbose }
    }
}

impl Render for ReportView<'_> {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        let scan = &self.report.scan;
        let summary = &self.report.summary;
        let outcome = summary.outcome.to_string();
        let outcome = match summary.outcome {
            ScanOutcome::Succeeded => outcome.green().bold(),
            ScanOutcome::Partial => outcome.yellow().bold(),
            ScanOutcome::Failed => outcome.red().bold(),
            ScanOutcome::InProgress => outcome.cyan().bold(),
        };

        writeln!(w, "Scan {} ({}, {})", scan.id.to_string().bold(), scan.status, outcome)?;
        writeln!(w, "  Target:  {} ({})", scan.target, scan.target.kind())?;
        writeln!(w, "  Owner:   {}", scan.owner)?;
        writeln!(w, "  Created: {}", scan.created_at.to_rfc3339())?;
        writeln!(w, "  Updated: {}", scan.updated_at.to_rfc3339())?;
        writeln!(
            w,
            "  Modules: {} total, {} completed, {} error, {} pending, {} running",
            summary.total, summary.completed, summary.errored, summary.pending, summary.running
        )?;

        writeln!(w)?;
        writeln!(w, "{:<14} {:<10} {:>9}  Detail", "Module", "Status", "Duration")?;
        writeln!(w, "{}", "-".repeat(72))?;

        for execution in &self.report.executions {
            let status = format!("{:<10}", execution.status.as_str());
            let status = match execution.status {
                ExecutionStatus::Completed => status.green(),
                ExecutionStatus::Error => status.red(),
                ExecutionStatus::Running => status.cyan(),
                ExecutionStatus::Pending => status.yellow(),
            };
            writeln!(
                w,
                "{:<14} {} {:>9}  {}",
                execution.module,
                status,
                duration(execution),
                detail(execution).dimmed()
            )?;

            if self.verbose && execution.status.is_terminal() {
                let pretty = serde_json::to_string_pretty(&execution.result)
                    .unwrap_or_else(|_| execution.result.to_string());
                for line in pretty.lines() {
                    writeln!(w, "    {line}")?;
                }
            }
        }

        Ok(())
    }
}

fn duration(execution: &ModuleExecution) -> String {
    match execution.finished_at {
        Some(finished) => {
            let ms = (finished - execution.executed_at).num_milliseconds().max(0);
            format!("{:.1}s", ms as f64 / 1000.0)
        }
        None => "-".to_owned(),
    }
}

fn detail(execution: &ModuleExecution) -> String {
    match execution.status {
        ExecutionStatus::Error => {
            let kind = execution.result["kind"].as_str().unwrap_or("error");
            let message = execution.result["error"].as_str().unwrap_or_default();
            format!("{kind}: {message}")
        }
        _ => String::new(),
    }
}
