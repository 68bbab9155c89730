//! Stage runner: shared hooks, then per-module hooks, for one boot event.
//!
//! Every step is best-effort. A failing script or module is recorded in the
//! [`StageReport`] and the sequence moves on; one broken module must never
//! keep the rest of the system from booting.

mod post_fs_data;

pub use post_fs_data::{load_sepolicy_rules, load_system_prop, on_post_fs_data, rotate_logs};

use anyhow::{Context as _, Result};
use std::fs;

use crate::common;
use crate::context::Context;
use crate::module::Registry;
use crate::platform::Platform;
use crate::report::{Failure, StageReport};
use crate::scripts;

/// Named points in the boot sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    PostFsData,
    PostMount,
    Service,
    BootCompleted,
}

impl Stage {
    /// Name used for `<name>.d` and `<name>.sh`.
    pub fn name(self) -> &'static str {
        match self {
            Stage::PostFsData => "post-fs-data",
            Stage::PostMount => "post-mount",
            Stage::Service => "service",
            Stage::BootCompleted => "boot-completed",
        }
    }

    /// Module script file for this stage.
    pub fn script_name(self) -> String {
        format!("{}.sh", self.name())
    }
}

/// Safe mode, recomputed on every call: the OS property or the kernel says so.
pub fn is_safe_mode(platform: &dyn Platform, credential: &str) -> bool {
    let by_prop = platform
        .getprop("persist.sys.safemode")
        .map(|v| v == "1")
        .unwrap_or(false);
    let safe = by_prop || (!credential.is_empty() && platform.kernel_safe_mode(credential));
    log::info!("safemode: {}", safe);
    safe
}

/// Run the executable entries of `<adb>/<stage>.d`, sorted by file name.
///
/// A missing directory means nothing to run.
pub fn exec_common_scripts(ctx: &Context<'_>, stage: Stage, wait: bool) -> Result<Vec<Failure>> {
    let dir = ctx.config.common_script_dir(stage.name());
    if !dir.exists() {
        log::debug!("{} not exists, skip", dir.display());
        return Ok(Vec::new());
    }

    let mut entries = fs::read_dir(&dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    let mut failures = Vec::new();
    for path in entries {
        if !common::is_executable(&path) {
            log::debug!("{} is not executable, skip", path.display());
            continue;
        }
        if let Err(e) = scripts::exec_script(ctx, &path, wait) {
            failures.push(Failure::new(path.display().to_string(), e));
        }
    }
    Ok(failures)
}

/// Run `<stage>.sh` of every active module that has one.
pub fn exec_stage_scripts(ctx: &Context<'_>, stage: Stage, wait: bool) -> Result<Vec<Failure>> {
    let registry = Registry::from_config(ctx.config);
    let script_name = stage.script_name();
    let mut failures = Vec::new();

    registry.for_each_active(|module| {
        let script = module.join(&script_name);
        if !script.exists() {
            return Ok(());
        }
        if let Err(e) = scripts::exec_script(ctx, &script, wait) {
            let name = module
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            failures.push(Failure::new(name, e));
        }
        Ok(())
    })?;

    Ok(failures)
}

/// Run a generic stage: shared hooks, then module hooks.
pub fn run_stage(ctx: &Context<'_>, stage: Stage, credential: &str, wait: bool) -> StageReport {
    let mut report = StageReport::new(stage.name());
    ctx.platform.set_umask(0);

    if ctx.platform.has_competing_root() {
        report.skip("scripts", "another root framework is active");
        return report;
    }

    if is_safe_mode(ctx.platform, credential) {
        report.skip("scripts", "safe mode");
        let registry = Registry::from_config(ctx.config);
        report.record_failures("disable-all", registry.disable_all());
        return report;
    }

    report.record_failures("common-scripts", exec_common_scripts(ctx, stage, wait));
    report.record_failures("module-scripts", exec_stage_scripts(ctx, stage, wait));
    report
}

/// `services` boot event. Scripts are detached.
pub fn on_services(ctx: &Context<'_>, credential: &str) -> StageReport {
    log::info!("on_services triggered!");
    run_stage(ctx, Stage::Service, credential, false)
}

/// `boot-completed` boot event. Scripts are detached.
pub fn on_boot_completed(ctx: &Context<'_>, credential: &str) -> StageReport {
    log::info!("on_boot_completed triggered!");
    run_stage(ctx, Stage::BootCompleted, credential, false)
}
