//! Removal of modules flagged with a `remove` marker.

use anyhow::Result;

use super::registry::Registry;
use crate::common;
use crate::config::{REMOVE_FILE, UNINSTALL_SH, UPDATE_FILE};
use crate::context::Context;
use crate::report::Failure;
use crate::scripts;

/// Clear stale per-module update markers and delete modules marked for removal.
///
/// A module with a `remove` marker gets its `uninstall.sh` run (failure is
/// tolerated), then its directory and its staged update copy are deleted.
/// Returns the failures met along the way; the ids removed are logged.
pub fn prune_modules(ctx: &Context<'_>) -> Result<Vec<Failure>> {
    let registry = Registry::from_config(ctx.config);
    let mut failures = Vec::new();

    // Listed up front: the loop deletes directories it has already seen.
    for (name, module_path) in registry.module_dirs()? {
        if let Err(e) = common::remove_file_if_exists(&module_path.join(UPDATE_FILE)) {
            failures.push(Failure::new(name.clone(), e));
        }

        if !module_path.join(REMOVE_FILE).exists() {
            continue;
        }

        log::info!("remove module: {}", module_path.display());

        let uninstaller = module_path.join(UNINSTALL_SH);
        if uninstaller.exists() {
            if let Err(e) = scripts::exec_script(ctx, &uninstaller, true) {
                log::warn!("failed to exec uninstaller: {:#}", e);
            }
        }

        if let Err(e) = common::remove_dir_if_exists(&module_path) {
            failures.push(Failure::new(name.clone(), e));
        }

        let updated = ctx.config.module_update_dir.join(&name);
        if let Err(e) = common::remove_dir_if_exists(&updated) {
            failures.push(Failure::new(name, e));
        }
    }

    Ok(failures)
}
