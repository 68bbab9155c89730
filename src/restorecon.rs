//! Security label restoration for the module tree.
//!
//! Unlike the rest of staging, a failure here aborts the walk and reaches the
//! caller: a partially mislabeled tree must not pass silently.

use anyhow::{Context as _, Result};
use std::path::Path;
use walkdir::WalkDir;

use crate::context::Context;
use crate::platform::Platform;

pub const SYSTEM_CON: &str = "u:object_r:system_file:s0";
pub const ADB_CON: &str = "u:object_r:adb_data_file:s0";
pub const UNLABEL_CON: &str = "u:object_r:unlabeled:s0";

/// Label every entry under `dir` (including `dir`) as system.
pub fn restore_syscon(platform: &dyn Platform, dir: &Path) -> Result<()> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        platform.set_file_label(entry.path(), SYSTEM_CON)?;
    }
    Ok(())
}

/// Label entries under `dir` as system where the label is empty or unlabeled.
///
/// Returns the number of entries relabeled.
pub fn restore_syscon_if_unlabeled(platform: &dyn Platform, dir: &Path) -> Result<usize> {
    let mut relabeled = 0;
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let label = platform.get_file_label(entry.path())?;
        if label.is_empty() || label == UNLABEL_CON {
            platform.set_file_label(entry.path(), SYSTEM_CON)?;
            relabeled += 1;
        }
    }
    Ok(relabeled)
}

/// Relabel the daemon binary and repair the module tree.
pub fn restore(ctx: &Context<'_>) -> Result<()> {
    ctx.platform
        .set_file_label(&ctx.config.daemon_path, ADB_CON)
        .with_context(|| format!("Failed to label {}", ctx.config.daemon_path.display()))?;
    let relabeled = restore_syscon_if_unlabeled(ctx.platform, &ctx.config.module_dir)?;
    log::info!("restorecon: {} entries relabeled", relabeled);
    Ok(())
}
