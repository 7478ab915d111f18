//! `centinela modules` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use centinela_core::module::{ModuleInfo, ModuleRegistry};
use centinela_core::queue::Lane;

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `modules` command.
pub async fn execute(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    let config = super::load_config(config_path).await?;
    let registry = super::build_registry(&config)?;
    writer.render(&ModuleList::from_registry(&registry))
}

#[derive(Serialize)]
pub struct ModuleList {
    pub modules: Vec<ModuleEntry>,
}

#[derive(Serialize)]
pub struct ModuleEntry {
    #[serde(flatten)]
    pub info: ModuleInfo,
    pub lane: Lane,
}

impl ModuleList {
    pub fn from_registry(registry: &ModuleRegistry) -> Self {
        let modules = registry
            .list()
            .into_iter()
            .map(|info| ModuleEntry {
                lane: Lane::for_class(info.resource_class),
                info,
            })
            .collect();
        Self { modules }
    }
}

impl Render for ModuleList {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.modules.is_empty() {
            writeln!(w, "{}", "No modules enabled.".yellow())?;
            return Ok(());
        }

        writeln!(w, "{:<12} {:<10} {:<8} Description", "Module", "Class", "Lane")?;
        writeln!(w, "{}", "-".repeat(72))?;
        for entry in &self.modules {
            writeln!(
                w,
                "{} {:<10} {:<8} {}",
                format!("{:<12}", entry.info.name).bold(),
                entry.info.resource_class.to_string(),
                entry.lane.as_str(),
                entry.info.description
            )?;
        }
        Ok(())
    }
}
