//! `centinela list` command handler

use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use serde::Serialize;

use centinela_core::store::StatusStore;
use centinela_core::types::{Scan, ScanStatus};
use centinela_engine::{Backends, ScanSummary};

use crate::cli::ListArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `list` command.
pub async fn execute(
    args: ListArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let status = args
        .status
        .as_deref()
        .map(ScanStatus::from_str)
        .transpose()
        .map_err(|e| CliError::Command(e.to_string()))?;

    let config = super::load_config(config_path).await?;
    let backends = super::open_persistent(&config, "list").await?;

    let report = match &backends {
        Backends::Memory { store, .. } => build_list(store.as_ref(), status).await?,
        Backends::SqliteStore { store, .. } => build_list(store.as_ref(), status).await?,
        Backends::Sqlite { store, .. } => build_list(store.as_ref(), status).await?,
    };

    writer.render(&report)
}

/// Scans with a per-scan execution summary.
pub async fn build_list<S: StatusStore>(
    store: &S,
    status: Option<ScanStatus>,
) -> Result<ScanList, CliError> {
    let scans = store
        .list_scans(status)
        .await
        .map_err(|e| CliError::Command(format!("failed to list scans: {}", e)))?;

    let mut entries = Vec::with_capacity(scans.len());
    for scan in scans {
        let executions = store
            .list_executions(scan.id)
            .await
            .map_err(|e| CliError::Command(format!("failed to list executions: {}", e)))?;
        entries.push(ScanListEntry {
            summary: ScanSummary::from_executions(&executions),
            scan,
        });
    }
    Ok(ScanList { scans: entries })
}

#[derive(Serialize)]
pub struct ScanList {
    pub scans: Vec<ScanListEntry>,
}

#[derive(Serialize)]
pub struct ScanListEntry {
    #[serde(flatten)]
    pub scan: Scan,
    pub summary: ScanSummary,
}

impl Render for ScanList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.scans.is_empty() {
            writeln!(w, "No scans found.")?;
            return Ok(());
        }

        writeln!(
            w,
            "{:<36}  {:<10} {:<12} {:<28} {:>7}  Owner",
            "Scan ID", "Status", "Outcome", "Target", "Modules"
        )?;
        writeln!(w, "{}", "-".repeat(110))?;
        for entry in &self.scans {
            let settled = entry.summary.completed + entry.summary.errored;
            let modules = format!("{}/{}", settled, entry.summary.total);
            writeln!(
                w,
                "{:<36}  {:<10} {:<12} {:<28} {:>7}  {}",
                entry.scan.id.to_string(),
                entry.scan.status.as_str(),
                entry.summary.outcome.to_string(),
                entry.scan.target.to_string(),
                modules,
                entry.scan.owner
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{} scan(s)", self.scans.len())?;
        Ok(())
    }
}
