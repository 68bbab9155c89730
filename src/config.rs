//! Configuration management for apd.
//!
//! Every path the daemon touches hangs off a single root (`/data/adb` on a
//! device). Reads an optional `.env` file and environment variables;
//! environment variables take precedence over the `.env` file.

use std::path::{Path, PathBuf};

/// Default root of the on-disk layout.
pub const DEFAULT_ADB_DIR: &str = "/data/adb";

/// Default interpreter for hook scripts.
pub const DEFAULT_SHELL: &str = "/system/bin/sh";

/// Marker file names shared by the registry, installer and stage runner.
pub const DISABLE_FILE: &str = "disable";
pub const UPDATE_FILE: &str = "update";
pub const REMOVE_FILE: &str = "remove";
pub const MODULE_PROP: &str = "module.prop";
pub const MODULE_WEB_DIR: &str = "web";
pub const MODULE_ACTION_SH: &str = "action.sh";
pub const UNINSTALL_SH: &str = "uninstall.sh";
pub const SYSTEM_PROP: &str = "system.prop";
pub const SEPOLICY_RULE: &str = "sepolicy.rule";

/// apd configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the layout (default: /data/adb)
    pub adb_dir: PathBuf,
    /// One subdirectory per module id
    pub module_dir: PathBuf,
    /// Staged update copies of modules
    pub module_update_dir: PathBuf,
    /// Working directory (global update marker, binaries, logs, image)
    pub working_dir: PathBuf,
    /// Helper binaries (busybox, magiskpolicy, resetprop)
    pub binary_dir: PathBuf,
    /// Boot log directory, rotated each post-fs-data
    pub log_dir: PathBuf,
    /// Overlay image holding the last prepared module view
    pub module_image: PathBuf,
    /// Directory the module view is presented on
    pub module_mount_dir: PathBuf,
    /// Operator opt-out from overlay presentation
    pub bind_mount_flag: PathBuf,
    /// The daemon's own executable
    pub daemon_path: PathBuf,
    /// Kernel filesystem list
    pub proc_filesystems: PathBuf,
    /// Candidate mount points for the scratch tmpfs, first existing wins
    pub tmpfs_candidates: Vec<PathBuf>,
    /// Interpreter for hook scripts
    pub shell: PathBuf,
}

impl Config {
    /// Load configuration from `.env` and the environment.
    ///
    /// Recognised variables:
    /// - `APD_ADB_DIR` - root of the layout
    /// - `APD_SHELL` - hook script interpreter
    pub fn load() -> Self {
        // A missing .env is the normal case on a device.
        dotenvy::dotenv().ok();

        let adb_dir = std::env::var("APD_ADB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ADB_DIR));

        let mut config = Self::with_adb_dir(&adb_dir);
        if let Ok(shell) = std::env::var("APD_SHELL") {
            config.shell = PathBuf::from(shell);
        }
        config
    }

    /// Derive the full layout under `adb_dir`.
    pub fn with_adb_dir(adb_dir: &Path) -> Self {
        let working_dir = adb_dir.join("ap");
        Self {
            adb_dir: adb_dir.to_path_buf(),
            module_dir: adb_dir.join("modules"),
            module_update_dir: adb_dir.join("modules_update"),
            binary_dir: working_dir.join("bin"),
            log_dir: working_dir.join("log"),
            module_image: working_dir.join("tmp_img.img"),
            module_mount_dir: working_dir.join("mnt"),
            bind_mount_flag: adb_dir.join(".bind_mount_enable"),
            daemon_path: adb_dir.join("apd"),
            proc_filesystems: PathBuf::from("/proc/filesystems"),
            tmpfs_candidates: vec![PathBuf::from("/sbin"), PathBuf::from("/debug_ramdisk")],
            shell: PathBuf::from(DEFAULT_SHELL),
            working_dir,
        }
    }

    /// Global "registry changed, rebuild the image" marker.
    pub fn update_flag(&self) -> PathBuf {
        self.working_dir.join(UPDATE_FILE)
    }

    pub fn busybox(&self) -> PathBuf {
        self.binary_dir.join("busybox")
    }

    pub fn magiskpolicy(&self) -> PathBuf {
        self.binary_dir.join("magiskpolicy")
    }

    pub fn resetprop(&self) -> PathBuf {
        self.binary_dir.join("resetprop")
    }

    /// Shared hook script directory for a stage, e.g. `<adb>/post-fs-data.d`.
    pub fn common_script_dir(&self, stage: &str) -> PathBuf {
        self.adb_dir.join(format!("{}.d", stage))
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  APD_ADB_DIR: {}", self.adb_dir.display());
        println!("  APD_SHELL: {}", self.shell.display());
        println!("  modules: {}", self.module_dir.display());
        println!("  image: {}", self.module_image.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_derives_from_root() {
        let config = Config::with_adb_dir(Path::new("/tmp/adb"));
        assert_eq!(config.module_dir, Path::new("/tmp/adb/modules"));
        assert_eq!(config.binary_dir, Path::new("/tmp/adb/ap/bin"));
        assert_eq!(config.update_flag(), Path::new("/tmp/adb/ap/update"));
        assert_eq!(
            config.common_script_dir("service"),
            Path::new("/tmp/adb/service.d")
        );
        assert_eq!(config.busybox(), Path::new("/tmp/adb/ap/bin/busybox"));
    }
}
