//! Module installation from a zip archive.

use anyhow::{Context as _, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

use super::prop;
use crate::common;
use crate::config::{MODULE_PROP, UPDATE_FILE};
use crate::context::Context;
use crate::error::ApdError;
use crate::process::Cmd;
use crate::scripts;

/// Install procedure run by busybox sh inside the extracted module directory.
const INSTALLER: &str = include_str!("../installer.sh");

/// Module ids become directory names and script variables.
const MODULE_ID_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9._-]*$";

/// Outcome of the external install procedure.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub id: String,
    pub module_path: PathBuf,
    /// True when the install procedure exited with status 0.
    pub success: bool,
    /// Combined stdout/stderr of the install procedure.
    pub output: String,
}

fn open_archive(zip_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(zip_path).map_err(|e| {
        ApdError::InvalidModule(format!("cannot open {}: {}", zip_path.display(), e))
    })?;
    let archive = ZipArchive::new(file).map_err(|e| {
        ApdError::InvalidModule(format!("{} is not a zip archive: {}", zip_path.display(), e))
    })?;
    Ok(archive)
}

/// Read `module.prop` from the archive root. A missing descriptor yields an empty map.
fn read_module_prop(archive: &mut ZipArchive<File>) -> Result<BTreeMap<String, String>> {
    let mut entry = match archive.by_name(MODULE_PROP) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(BTreeMap::new()),
        Err(e) => return Err(ApdError::InvalidModule(format!("{}: {}", MODULE_PROP, e)).into()),
    };
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {} from archive", MODULE_PROP))?;
    Ok(prop::parse_props(&String::from_utf8_lossy(&bytes)))
}

/// Resolve an archive entry name to a path relative to the destination.
///
/// Absolute names and any `..` component are rejected: the entry would land
/// outside the module directory.
pub fn safe_entry_path(name: &str) -> Result<PathBuf> {
    let mut relative = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ApdError::PathTraversal(name.to_string()).into());
            }
        }
    }
    Ok(relative)
}

/// Check every entry name, returning the relative paths by entry index.
fn checked_entry_paths(archive: &mut ZipArchive<File>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index_raw(i)?;
        paths.push(safe_entry_path(entry.name())?);
    }
    Ok(paths)
}

/// Write every entry into `dest`. `paths` comes from [`checked_entry_paths`].
fn extract_entries(
    archive: &mut ZipArchive<File>,
    paths: Vec<PathBuf>,
    dest: &Path,
) -> Result<()> {
    for (i, relative) in paths.into_iter().enumerate() {
        let mut entry = archive.by_index(i)?;
        let out_path = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .with_context(|| format!("Failed to create {}", out_path.display()))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", entry.name()))?;

        if let Some(mode) = entry.unix_mode().filter(|m| m & 0o777 != 0) {
            common::set_mode(&out_path, mode & 0o7777)?;
        }
    }
    Ok(())
}

fn ensure_boot_completed(ctx: &Context<'_>) -> Result<()> {
    match ctx.platform.getprop("sys.boot_completed") {
        Ok(value) if value == "1" => Ok(()),
        Ok(_) => Err(ApdError::BootNotReady.into()),
        Err(e) => {
            log::warn!("getprop sys.boot_completed failed: {:#}", e);
            Err(ApdError::BootNotReady.into())
        }
    }
}

/// Mark the registry as changed so the next post-fs-data rebuilds the image.
pub fn mark_update(ctx: &Context<'_>) -> Result<()> {
    common::ensure_file_exists(&ctx.config.update_flag())
}

/// Install a module archive.
///
/// The pending-update marker is written whatever the install procedure's exit
/// status, so the next boot re-evaluates a half-installed module instead of
/// serving a stale image.
pub fn install_module(ctx: &Context<'_>, zip_path: &Path) -> Result<InstallReport> {
    ensure_boot_completed(ctx)?;

    let config = ctx.config;
    common::ensure_dir_exists(&config.working_dir, 0o700)
        .context("failed to create working dir")?;
    common::ensure_dir_exists(&config.binary_dir, 0o700).context("failed to create bin dir")?;

    let mut archive = open_archive(zip_path)?;
    let props = read_module_prop(&mut archive)?;
    let id = props.get("id").map(|s| s.trim()).unwrap_or_default();
    if id.is_empty() {
        return Err(ApdError::InvalidModule("module id not found in module.prop".into()).into());
    }
    if !Regex::new(MODULE_ID_PATTERN)?.is_match(id) {
        return Err(ApdError::InvalidModule(format!("illegal module id: {}", id)).into());
    }
    log::info!("installing module {} from {}", id, zip_path.display());

    let module_path = config.module_dir.join(id);
    common::ensure_dir_exists(&config.module_dir, 0o755)?;

    // Every entry is checked before any existing copy of the module is touched.
    let paths = checked_entry_paths(&mut archive)?;
    common::ensure_clean_dir(&module_path).context("failed to create module folder")?;
    extract_entries(&mut archive, paths, &module_path)?;

    let result = Cmd::path(&config.busybox())
        .args(["sh", "-c", INSTALLER])
        .envs(scripts::script_env(ctx))
        .env("OUTFD", "1")
        .env("ZIPFILE", zip_path.to_string_lossy())
        .env("MODPATH", module_path.to_string_lossy())
        .env("MODID", id)
        .dir(&module_path)
        .allow_fail()
        .run();

    let (success, output) = match result {
        Ok(result) => {
            if !result.success() {
                log::warn!("install procedure for {} exited with {}", id, result.code());
            }
            (result.success(), result.combined())
        }
        Err(e) => {
            log::warn!("install procedure for {} did not run: {:#}", id, e);
            (false, format!("{:#}", e))
        }
    };

    common::ensure_file_exists(&module_path.join(UPDATE_FILE))?;
    mark_update(ctx)?;

    Ok(InstallReport {
        id: id.to_string(),
        module_path,
        success,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_entry_path_accepts_nested() {
        let path = safe_entry_path("system/bin/./tool").unwrap();
        assert_eq!(path, Path::new("system/bin/tool"));
    }

    #[test]
    fn test_safe_entry_path_rejects_parent() {
        for name in ["../escape", "a/../../b", "/etc/passwd", "system/.."] {
            let err = safe_entry_path(name).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<ApdError>(), Some(ApdError::PathTraversal(_))),
                "{name} accepted"
            );
        }
    }

    #[test]
    fn test_module_id_pattern() {
        let re = Regex::new(MODULE_ID_PATTERN).unwrap();
        assert!(re.is_match("x"));
        assert!(re.is_match("zygisk_lsposed"));
        assert!(re.is_match("a.b-c_1"));
        assert!(!re.is_match("../x"));
        assert!(!re.is_match("1abc"));
        assert!(!re.is_match("a/b"));
    }
}
