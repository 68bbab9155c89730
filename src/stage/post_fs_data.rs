//! The `post-fs-data` sequence.
//!
//! Order: base policy, boot log, shared scripts, binary dir, overlay image,
//! prune, restorecon, module policy rules, scratch tmpfs, module scripts,
//! module properties, then the `post-mount` stage. Safe mode stops after the
//! binary dir and leaves the overlay image alone.

use anyhow::{anyhow, Context as _, Result};
use std::fs;
use std::path::Path;

use super::{exec_common_scripts, exec_stage_scripts, is_safe_mode, run_stage, Stage};
use crate::common;
use crate::config::{SEPOLICY_RULE, SYSTEM_PROP};
use crate::context::Context;
use crate::module::{prune_modules, Registry};
use crate::overlay;
use crate::report::{Failure, StageReport};
use crate::restorecon;

/// Delete `*.old` files, then rename every other file to `<name>.old`.
pub fn rotate_logs(log_dir: &Path) -> Result<()> {
    let files = |dir: &Path| -> Result<Vec<std::path::PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                out.push(entry.path());
            }
        }
        Ok(out)
    };

    for path in files(log_dir)? {
        if path.extension().is_some_and(|ext| ext == "old") {
            common::remove_file_if_exists(&path)?;
        }
    }
    for path in files(log_dir)? {
        let mut old = path.clone().into_os_string();
        old.push(".old");
        fs::rename(&path, &old)
            .with_context(|| format!("Failed to rotate {}", path.display()))?;
    }
    Ok(())
}

fn setup_boot_log(ctx: &Context<'_>) -> Result<()> {
    let log_dir = &ctx.config.log_dir;
    common::ensure_dir_exists(log_dir, 0o700)?;
    rotate_logs(log_dir)?;
    ctx.platform.start_boot_log_capture(log_dir)
}

fn ensure_binary_dir(ctx: &Context<'_>) -> Result<()> {
    let binary_dir = &ctx.config.binary_dir;
    common::ensure_dir_exists(binary_dir, 0o755)?;
    common::set_mode(binary_dir, 0o755)
}

fn mount_scratch_tmpfs(ctx: &Context<'_>) -> Result<()> {
    let target = common::first_existing(&ctx.config.tmpfs_candidates)
        .ok_or_else(|| anyhow!("no temp dir available for tmpfs"))?;
    log::info!("mount tmpfs on {}", target.display());
    ctx.platform.mount_tmpfs(target)
}

/// Apply every active module's `sepolicy.rule`.
pub fn load_sepolicy_rules(ctx: &Context<'_>) -> Result<Vec<Failure>> {
    let mut failures = Vec::new();
    Registry::from_config(ctx.config).for_each_active(|module| {
        let rule = module.join(SEPOLICY_RULE);
        if !rule.exists() {
            return Ok(());
        }
        log::info!("load policy: {}", rule.display());
        if let Err(e) = ctx.platform.apply_policy_rule(&rule) {
            failures.push(Failure::new(rule.display().to_string(), e));
        }
        Ok(())
    })?;
    Ok(failures)
}

/// Load every active module's `system.prop` into the property store.
pub fn load_system_prop(ctx: &Context<'_>) -> Result<Vec<Failure>> {
    let mut failures = Vec::new();
    Registry::from_config(ctx.config).for_each_active(|module| {
        let prop = module.join(SYSTEM_PROP);
        if !prop.exists() {
            return Ok(());
        }
        log::info!("load {} system.prop", module.display());
        if let Err(e) = ctx.platform.load_prop_file(&prop) {
            failures.push(Failure::new(prop.display().to_string(), e));
        }
        Ok(())
    })?;
    Ok(failures)
}

/// Handle the `post-fs-data` boot event.
pub fn on_post_fs_data(ctx: &Context<'_>, credential: &str) -> StageReport {
    let stage = Stage::PostFsData;
    let mut report = StageReport::new(stage.name());
    ctx.platform.set_umask(0);

    report.record("base-policy", ctx.platform.apply_base_policy());

    if ctx.platform.has_competing_root() {
        report.skip("post-fs-data", "another root framework is active");
        return report;
    }

    report.record("boot-log", setup_boot_log(ctx));

    let registry = Registry::from_config(ctx.config);
    let safe_mode = is_safe_mode(ctx.platform, credential);
    if safe_mode {
        report.skip("common-scripts", "safe mode");
        report.record_failures("disable-all", registry.disable_all());
    } else {
        report.record_failures("common-scripts", exec_common_scripts(ctx, stage, true));
    }

    report.record("binary-dir", ensure_binary_dir(ctx));

    if safe_mode {
        // The image and any pending update are left for the next normal boot.
        report.skip("overlay", "safe mode");
        report.skip("modules", "safe mode");
        return report;
    }

    if let Some(action) = report.record("overlay", overlay::prepare(ctx)) {
        log::info!("overlay: {:?}", action);
    }

    report.record_failures("prune", prune_modules(ctx));
    report.record("restorecon", restorecon::restore(ctx));
    report.record_failures("sepolicy", load_sepolicy_rules(ctx));
    report.record("tmpfs", mount_scratch_tmpfs(ctx));
    report.record_failures("module-scripts", exec_stage_scripts(ctx, stage, true));
    report.record_failures("system-prop", load_system_prop(ctx));

    report.absorb(run_stage(ctx, Stage::PostMount, credential, true));
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rotate_logs() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        fs::write(dir.join("logcat.log"), "new").unwrap();
        fs::write(dir.join("logcat.log.old"), "stale").unwrap();
        fs::write(dir.join("dmesg.log"), "d").unwrap();

        rotate_logs(dir).unwrap();

        assert!(!dir.join("logcat.log").exists());
        assert_eq!(fs::read_to_string(dir.join("logcat.log.old")).unwrap(), "new");
        assert!(dir.join("dmesg.log.old").exists());
        assert_eq!(fs::read_dir(dir).unwrap().count(), 2);
    }
}
