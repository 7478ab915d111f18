//! `centinela submit` command handler
//!
//! Persists the scan and enqueues its tasks on the shared sqlite queue,
//! then returns immediately. A daemon using the same database runs it.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use centinela_core::queue::Lane;
use centinela_engine::{Backends, ScanCoordinator};

use crate::cli::SubmitArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `submit` command.
pub async fn execute(
    args: SubmitArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let registry = super::build_registry(&config)?;
    let backends = super::open_persistent(&config, "submit").await?;

    let Backends::Sqlite { store, queue } = backends else {
        return Err(CliError::Config(
            "`submit` needs queue.backend = \"sqlite\" so a daemon can see the tasks; use `scan` to run in-process"
                .to_owned(),
        ));
    };

    let request = args.target.to_request();
    let coordinator = ScanCoordinator::new(store, queue, registry.clone());
    let scan_id = coordinator.submit_scan(request.clone()).await?;

    let modules = request
        .modules
        .iter()
        .filter_map(|name| registry.resolve(name).ok())
        .map(|module| {
            let info = module.info();
            SubmittedModule {
                name: info.name.clone(),
                lane: Lane::for_class(info.resource_class),
            }
        })
        .collect();

    writer.render(&SubmitReport {
        scan_id: scan_id.to_string(),
        target: request.target,
        modules,
    })
}

#[derive(Serialize)]
pub struct SubmitReport {
    pub scan_id: String,
    pub target: String,
    pub modules: Vec<SubmittedModule>,
}

#[derive(Serialize)]
pub struct SubmittedModule {
    pub name: String,
    pub lane: Lane,
}

impl Render for SubmitReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Submitted scan {}", self.scan_id.bold())?;
        writeln!(w, "  Target: {}", self.target)?;
        for module in &self.modules {
            writeln!(w, "  {:<14} -> {} lane", module.name, module.lane)?;
        }
        writeln!(w)?;
        writeln!(w, "Follow with: centinela status {} --wait", self.scan_id)?;
        Ok(())
    }
}
