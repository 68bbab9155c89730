//! apd - boot-stage orchestrator and module manager.
//!
//! Invoked by init at post-fs-data, services and boot-completed, and by the
//! manager app for module lifecycle operations.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use apd::commands::{self, BootEvent, ModuleCommand};
use apd::platform::{Platform, SystemPlatform};
use apd::{logging, Config, Context};

#[derive(Parser)]
#[command(name = "apd")]
#[command(about = "Root module daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage modules
    Module {
        #[command(subcommand)]
        command: ModuleTarget,
    },

    /// Trigger the post-fs-data event
    PostFsData {
        /// Bootstrap credential, forwarded as-is
        superkey: String,
    },

    /// Trigger the services event
    Services {
        /// Bootstrap credential, forwarded as-is
        superkey: String,
    },

    /// Trigger the boot-completed event
    BootCompleted {
        /// Bootstrap credential, forwarded as-is
        superkey: String,
    },

    /// Read a system property
    Getprop { key: String },

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum ModuleTarget {
    /// Install a module zip
    Install { zip: PathBuf },
    /// List installed modules as JSON
    List,
    /// Enable a module
    Enable { id: String },
    /// Disable a module
    Disable { id: String },
    /// Disable every module
    #[command(alias = "disable_all_modules")]
    DisableAll,
}

fn run(cli: Cli, ctx: &Context<'_>) -> Result<()> {
    match cli.command {
        Commands::Module { command } => {
            let command = match command {
                ModuleTarget::Install { zip } => ModuleCommand::Install { zip },
                ModuleTarget::List => ModuleCommand::List,
                ModuleTarget::Enable { id } => ModuleCommand::Enable { id },
                ModuleTarget::Disable { id } => ModuleCommand::Disable { id },
                ModuleTarget::DisableAll => ModuleCommand::DisableAll,
            };
            commands::cmd_module(ctx, command)?;
        }
        Commands::PostFsData { superkey } => {
            commands::cmd_event(ctx, BootEvent::PostFsData, &superkey);
        }
        Commands::Services { superkey } => {
            commands::cmd_event(ctx, BootEvent::Services, &superkey);
        }
        Commands::BootCompleted { superkey } => {
            commands::cmd_event(ctx, BootEvent::BootCompleted, &superkey);
        }
        Commands::Getprop { key } => {
            let value = ctx.platform.getprop(&key)?;
            println!("{}: {}", key, value);
        }
        Commands::Config => ctx.config.print(),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Keep the handle alive; dropping it stops the logger.
    let _logger = match logging::init_logging() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Warning: {:#}", e);
            None
        }
    };

    let config = Config::load();
    let platform = SystemPlatform::new(&config);
    let ctx = Context::new(&config, &platform);

    match run(cli, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
