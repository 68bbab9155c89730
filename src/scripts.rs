//! Hook script execution and the environment every script receives.

use anyhow::{Context as _, Result};
use std::path::Path;

use crate::context::Context;
use crate::process::Cmd;

/// Framework version reported to scripts.
pub const VERSION_NAME: &str = env!("CARGO_PKG_VERSION");

/// Numeric framework version reported to scripts.
pub const VERSION_CODE: &str = "10993";

/// Variables identifying the framework, plus `PATH` extended with the binary dir.
pub fn script_env(ctx: &Context<'_>) -> Vec<(String, String)> {
    let path = match std::env::var("PATH") {
        Ok(path) if !path.is_empty() => {
            format!("{}:{}", path, ctx.config.binary_dir.display())
        }
        _ => ctx.config.binary_dir.display().to_string(),
    };
    vec![
        ("ASH_STANDALONE".to_string(), "1".to_string()),
        ("APATCH".to_string(), "true".to_string()),
        ("APATCH_VER".to_string(), VERSION_NAME.to_string()),
        ("APATCH_VER_CODE".to_string(), VERSION_CODE.to_string()),
        ("PATH".to_string(), path),
    ]
}

/// Run one script with the configured shell from its own directory.
///
/// With `wait` the call blocks and a non-zero exit is an error. Without it
/// the script is detached into the root cgroups and never observed again.
pub fn exec_script(ctx: &Context<'_>, script: &Path, wait: bool) -> Result<()> {
    log::info!("exec {}", script.display());

    let mut cmd = Cmd::path(&ctx.config.shell)
        .arg_path(script)
        .envs(script_env(ctx))
        .error_msg(format!("Failed to exec {}", script.display()));
    if let Some(dir) = script.parent() {
        cmd = cmd.dir(dir);
    }

    if wait {
        cmd.run()?;
    } else {
        let pid = cmd
            .spawn()
            .with_context(|| format!("Failed to exec {}", script.display()))?;
        if let Err(e) = ctx.platform.switch_cgroups(pid) {
            log::warn!("Failed to switch cgroups for {}: {:#}", pid, e);
        }
    }
    Ok(())
}
