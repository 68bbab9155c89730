//! Overlay image management.
//!
//! The image holds the last prepared view of the active modules. It is
//! rebuilt when the registry changed (update marker) or when there is no image
//! yet, and remounted as-is otherwise.

use anyhow::{Context as _, Result};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

use crate::common;
use crate::config::{DISABLE_FILE, REMOVE_FILE};
use crate::context::Context;
use crate::module::Registry;
use crate::restorecon;

/// What preparation did this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayAction {
    /// A fresh image was created and filled from the registry.
    Rebuilt,
    /// The existing image was mounted again.
    Remounted,
    /// Overlay is unusable; presentation falls back to another mechanism.
    Unused,
}

/// True when `/proc/filesystems` content lists overlay.
pub fn filesystems_support_overlay(content: &str) -> bool {
    content
        .lines()
        .any(|line| line.split_whitespace().last() == Some("overlay"))
}

/// Read the kernel filesystem list and look for overlay.
pub fn is_overlayfs_supported(proc_filesystems: &Path) -> Result<bool> {
    let content = fs::read_to_string(proc_filesystems)
        .with_context(|| format!("failed to open {}", proc_filesystems.display()))?;
    Ok(filesystems_support_overlay(&content))
}

/// Overlay is usable when the kernel has it and the operator did not opt out.
pub fn should_enable_overlay(ctx: &Context<'_>) -> bool {
    if ctx.config.bind_mount_flag.exists() {
        return false;
    }
    match is_overlayfs_supported(&ctx.config.proc_filesystems) {
        Ok(supported) => supported,
        Err(e) => {
            log::warn!("{:#}", e);
            false
        }
    }
}

/// Copy a module tree, leaving out its state markers.
fn copy_module(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        if relative == Path::new(DISABLE_FILE) || relative == Path::new(REMOVE_FILE) {
            continue;
        }
        let target = dest.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("Failed to copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

/// Create a new image and fill it with every active module from the registry.
fn rebuild(ctx: &Context<'_>) -> Result<()> {
    let config = ctx.config;
    let mount_dir = &config.module_mount_dir;

    common::ensure_clean_dir(mount_dir)?;
    common::remove_file_if_exists(&config.update_flag())?;
    log::info!("remove update flag");

    ctx.platform.create_image(&config.module_image)?;
    ctx.platform.mount_image(&config.module_image, mount_dir)?;

    let registry = Registry::from_config(config);
    registry.for_each_active(|module| {
        if module.join(REMOVE_FILE).exists() {
            return Ok(());
        }
        let Some(name) = module.file_name() else {
            return Ok(());
        };
        log::info!("- Copying {}", name.to_string_lossy());
        copy_module(module, &mount_dir.join(name))
    })?;

    restorecon::restore_syscon(ctx.platform, mount_dir)
}

/// Decide between rebuild and remount and carry it out.
pub fn prepare(ctx: &Context<'_>) -> Result<OverlayAction> {
    if !should_enable_overlay(ctx) {
        log::info!("overlay unavailable, image untouched");
        return Ok(OverlayAction::Unused);
    }

    let config = ctx.config;
    if config.update_flag().exists() || !config.module_image.exists() {
        rebuild(ctx).context("failed to rebuild module image")?;
        return Ok(OverlayAction::Rebuilt);
    }

    common::ensure_clean_dir(&config.module_mount_dir)?;
    log::info!("- Mounting image");
    ctx.platform
        .mount_image(&config.module_image, &config.module_mount_dir)?;
    Ok(OverlayAction::Remounted)
}
