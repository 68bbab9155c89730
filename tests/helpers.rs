//! Shared test utilities for apd tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use apd::platform::Platform;
use apd::{Config, Context};

/// Platform fake that records every call and keeps labels in memory.
#[derive(Default)]
pub struct FakePlatform {
    pub props: RefCell<HashMap<String, String>>,
    pub labels: RefCell<HashMap<PathBuf, String>>,
    pub calls: RefCell<Vec<String>>,
    pub competing_root: bool,
    pub kernel_safe_mode: bool,
    /// Paths whose label cannot be set.
    pub label_failures: Vec<PathBuf>,
    /// Policy rule files that fail to apply.
    pub policy_failures: Vec<PathBuf>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boot finished, not in safe mode.
    pub fn booted() -> Self {
        let platform = Self::new();
        platform.set_prop("sys.boot_completed", "1");
        platform
    }

    pub fn set_prop(&self, key: &str, value: &str) {
        self.props
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    /// Calls whose text starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Give `path` a label without recording a call.
    pub fn preset_label(&self, path: &Path, label: &str) {
        self.labels
            .borrow_mut()
            .insert(path.to_path_buf(), label.to_string());
    }

    pub fn label_of(&self, path: &Path) -> Option<String> {
        self.labels.borrow().get(path).cloned()
    }
}

impl Platform for FakePlatform {
    fn getprop(&self, key: &str) -> Result<String> {
        Ok(self.props.borrow().get(key).cloned().unwrap_or_default())
    }

    fn load_prop_file(&self, path: &Path) -> Result<()> {
        self.log(format!("load_prop_file {}", path.display()));
        Ok(())
    }

    fn apply_base_policy(&self) -> Result<()> {
        self.log("apply_base_policy".to_string());
        Ok(())
    }

    fn apply_policy_rule(&self, path: &Path) -> Result<()> {
        self.log(format!("apply_policy_rule {}", path.display()));
        if self.policy_failures.iter().any(|p| p == path) {
            bail!("magiskpolicy rejected {}", path.display());
        }
        Ok(())
    }

    fn get_file_label(&self, path: &Path) -> Result<String> {
        Ok(self.labels.borrow().get(path).cloned().unwrap_or_default())
    }

    fn set_file_label(&self, path: &Path, label: &str) -> Result<()> {
        self.log(format!("set_file_label {} {}", path.display(), label));
        if self.label_failures.iter().any(|p| p == path) {
            bail!("lsetxattr {}: permission denied", path.display());
        }
        self.labels
            .borrow_mut()
            .insert(path.to_path_buf(), label.to_string());
        Ok(())
    }

    fn create_image(&self, image: &Path) -> Result<()> {
        self.log(format!("create_image {}", image.display()));
        fs::write(image, b"")?;
        Ok(())
    }

    fn mount_image(&self, image: &Path, target: &Path) -> Result<()> {
        self.log(format!("mount_image {} {}", image.display(), target.display()));
        Ok(())
    }

    fn mount_tmpfs(&self, target: &Path) -> Result<()> {
        self.log(format!("mount_tmpfs {}", target.display()));
        Ok(())
    }

    fn set_umask(&self, mask: u32) {
        self.log(format!("set_umask {:o}", mask));
    }

    fn has_competing_root(&self) -> bool {
        self.competing_root
    }

    fn kernel_safe_mode(&self, _credential: &str) -> bool {
        self.kernel_safe_mode
    }

    fn start_boot_log_capture(&self, log_dir: &Path) -> Result<()> {
        self.log(format!("start_boot_log_capture {}", log_dir.display()));
        Ok(())
    }

    fn switch_cgroups(&self, pid: u32) -> Result<()> {
        self.log(format!("switch_cgroups {}", pid));
        Ok(())
    }
}

/// Test environment: a private `/data/adb` layout in a temp dir.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    pub root: PathBuf,
    pub config: Config,
    /// Scripts append a line here so tests can see what ran.
    pub trace: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();

        let mut config = Config::with_adb_dir(&root.join("adb"));
        config.shell = PathBuf::from("/bin/sh");
        config.proc_filesystems = root.join("filesystems");
        config.tmpfs_candidates = vec![root.join("debug_ramdisk")];

        fs::create_dir_all(&config.module_dir).expect("Failed to create module dir");
        fs::create_dir_all(&config.working_dir).expect("Failed to create working dir");
        fs::create_dir_all(root.join("debug_ramdisk")).expect("Failed to create tmpfs dir");
        fs::write(&config.proc_filesystems, "nodev\tsysfs\n\text4\nnodev\toverlay\n")
            .expect("Failed to write filesystems");

        Self {
            trace: root.join("trace.log"),
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    pub fn ctx<'a>(&'a self, platform: &'a FakePlatform) -> Context<'a> {
        Context::new(&self.config, platform)
    }

    /// Create a module directory with a descriptor.
    pub fn create_module(&self, id: &str) -> PathBuf {
        self.create_module_with_prop(id, &format!("id={id}\nname=Module {id}\nversion=v1\n"))
    }

    pub fn create_module_with_prop(&self, dir: &str, prop: &str) -> PathBuf {
        let path = self.config.module_dir.join(dir);
        fs::create_dir_all(&path).expect("Failed to create module");
        fs::write(path.join("module.prop"), prop).expect("Failed to write module.prop");
        path
    }

    /// Write a script that appends `tag` to the trace file.
    pub fn tracing_script(&self, path: &Path, tag: &str) {
        write_script(
            path,
            &format!("#!/bin/sh\necho {} >> '{}'\n", tag, self.trace.display()),
        );
    }

    /// Lines appended to the trace file so far.
    pub fn trace_lines(&self) -> Vec<String> {
        fs::read_to_string(&self.trace)
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Install a busybox stand-in that runs its applet arguments with /bin/sh.
    pub fn install_fake_busybox(&self) {
        write_script(&self.config.busybox(), "#!/bin/sh\nshift\nexec /bin/sh \"$@\"\n");
    }
}

/// Write an executable script, creating parent directories.
pub fn write_script(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create script dir");
    }
    fs::write(path, content).expect("Failed to write script");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .expect("Failed to set permissions");
}

/// Build a zip archive from (name, content) pairs.
pub fn create_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = File::create(path).expect("Failed to create zip");
    let mut zip = ZipWriter::new(file);
    for (name, content) in entries {
        let options = SimpleFileOptions::default().unix_permissions(0o644);
        zip.start_file(*name, options).expect("Failed to start zip entry");
        zip.write_all(content.as_bytes())
            .expect("Failed to write zip entry");
    }
    zip.finish().expect("Failed to finish zip");
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a file does not exist.
pub fn assert_not_exists(path: &Path) {
    assert!(!path.exists(), "Expected no file at: {}", path.display());
}
