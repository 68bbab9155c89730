//! Utilities for path checking and directory management.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// Ensure a directory exists, creating it (and parents) with `mode` if needed.
///
/// An existing directory keeps its current permissions.
pub fn ensure_dir_exists(path: &Path, mode: u32) -> Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    fs::DirBuilder::new()
        .recursive(true)
        .mode(mode)
        .create(path)
        .with_context(|| format!("Failed to create directory {}", path.display()))
}

/// Prepare an empty directory, removing it first if it exists.
pub fn ensure_clean_dir(path: &Path) -> Result<()> {
    if path.exists() {
        log::debug!("ensure_clean_dir: {} exists, removing it", path.display());
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove {}", path.display()))?;
    }
    fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// Remove a directory tree, treating "already gone" as success.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Return the first candidate that exists.
pub fn first_existing<'a>(candidates: &'a [std::path::PathBuf]) -> Option<&'a Path> {
    candidates
        .iter()
        .map(|p| p.as_path())
        .find(|p| p.exists())
}
