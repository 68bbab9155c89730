//! Module lifecycle commands: install, list, enable, disable, disable-all.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::Path;

use crate::context::Context;
use crate::module::{self, Registry};

/// Lifecycle operation requested by the operator.
pub enum ModuleCommand {
    Install { zip: std::path::PathBuf },
    List,
    Enable { id: String },
    Disable { id: String },
    DisableAll,
}

/// All modules as key/value records, sorted by directory name.
pub fn list_records(ctx: &Context<'_>) -> Result<Vec<BTreeMap<String, String>>> {
    let registry = Registry::from_config(ctx.config);
    Ok(registry.list()?.iter().map(|m| m.to_record()).collect())
}

fn cmd_install(ctx: &Context<'_>, zip: &Path) -> Result<()> {
    println!("Installing module: {}", zip.display());
    let report = module::install_module(ctx, zip)?;
    if !report.output.is_empty() {
        println!("{}", report.output.trim_end());
    }
    if !report.success {
        anyhow::bail!(
            "install procedure for {} failed; module will be re-evaluated on next boot",
            report.id
        );
    }
    Ok(())
}

/// Execute a module command.
pub fn cmd_module(ctx: &Context<'_>, command: ModuleCommand) -> Result<()> {
    let registry = Registry::from_config(ctx.config);
    match command {
        ModuleCommand::Install { zip } => cmd_install(ctx, &zip)?,
        ModuleCommand::List => {
            let records = list_records(ctx)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        ModuleCommand::Enable { id } => registry.set_disabled(&id, false)?,
        ModuleCommand::Disable { id } => registry.set_disabled(&id, true)?,
        ModuleCommand::DisableAll => {
            for failure in registry.disable_all()? {
                println!("Failed to disable module: {}", failure);
            }
        }
    }
    Ok(())
}
