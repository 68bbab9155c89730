//! Operating system primitives the engine calls but does not implement.
//!
//! Property store, SELinux labels, policy patching, mounts, cgroups and the
//! boot log capture all sit behind [`Platform`]. [`SystemPlatform`] is the
//! on-device implementation; tests substitute a recording fake.

use anyhow::{Context, Result};
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::common;
use crate::config::Config;
use crate::process::Cmd;

/// Extended attribute holding the SELinux label of a path.
pub const SELINUX_XATTR: &str = "security.selinux";

/// Size of the overlay image created on rebuild. The file is sparse.
const MODULE_IMAGE_SIZE: u64 = 256 * 1024 * 1024;

/// How long the boot log captures may run before being killed.
const LOG_CAPTURE_SECS: &str = "120s";

/// Run `$2..` with stdout and stderr sent to the file named by `$1`.
const CAPTURE_TO_FILE: &str = r#"out="$1"; shift; exec "$@" > "$out" 2>&1"#;

pub trait Platform {
    /// Read a system property; an unset property reads as "".
    fn getprop(&self, key: &str) -> Result<String>;

    /// Bulk-load property overrides from a `key=value` file.
    fn load_prop_file(&self, path: &Path) -> Result<()>;

    /// Inject the framework's own base policy into the live policy.
    fn apply_base_policy(&self) -> Result<()>;

    /// Apply a module's policy rule file to the live policy.
    fn apply_policy_rule(&self, path: &Path) -> Result<()>;

    /// Read the SELinux label of a path without following symlinks.
    fn get_file_label(&self, path: &Path) -> Result<String>;

    /// Set the SELinux label of a path without following symlinks.
    fn set_file_label(&self, path: &Path, label: &str) -> Result<()>;

    /// Create a fresh, empty filesystem image at `image`.
    fn create_image(&self, image: &Path) -> Result<()>;

    /// Mount a filesystem image onto `target`.
    fn mount_image(&self, image: &Path, target: &Path) -> Result<()>;

    /// Mount a private tmpfs at `target` (with devpts at `target/pts`).
    fn mount_tmpfs(&self, target: &Path) -> Result<()>;

    /// Set the process file-creation mask.
    fn set_umask(&self, mask: u32);

    /// True when another root framework already owns the boot hooks.
    fn has_competing_root(&self) -> bool;

    /// Ask the kernel whether safe mode was requested, using the bootstrap credential.
    fn kernel_safe_mode(&self, credential: &str) -> bool;

    /// Start the time-capped boot log captures into `log_dir`, detached.
    fn start_boot_log_capture(&self, log_dir: &Path) -> Result<()>;

    /// Move a process into the root cgroups so it outlives the caller's group.
    fn switch_cgroups(&self, pid: u32) -> Result<()>;
}

/// The on-device implementation.
pub struct SystemPlatform {
    busybox: PathBuf,
    magiskpolicy: PathBuf,
    resetprop: PathBuf,
}

impl SystemPlatform {
    pub fn new(config: &Config) -> Self {
        Self {
            busybox: config.busybox(),
            magiskpolicy: config.magiskpolicy(),
            resetprop: config.resetprop(),
        }
    }
}

fn c_path(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("path contains NUL: {}", path.display()))
}

impl Platform for SystemPlatform {
    fn getprop(&self, key: &str) -> Result<String> {
        let result = Cmd::new("getprop")
            .arg(key)
            .error_msg(format!("getprop {} failed", key))
            .run()?;
        Ok(result.stdout_trimmed().to_string())
    }

    fn load_prop_file(&self, path: &Path) -> Result<()> {
        Cmd::path(&self.resetprop)
            .args(["-n", "--file"])
            .arg_path(path)
            .run()?;
        Ok(())
    }

    fn apply_base_policy(&self) -> Result<()> {
        Cmd::path(&self.magiskpolicy)
            .args(["--magisk", "--live"])
            .run()?;
        Ok(())
    }

    fn apply_policy_rule(&self, path: &Path) -> Result<()> {
        Cmd::path(&self.magiskpolicy)
            .args(["--live", "--apply"])
            .arg_path(path)
            .run()?;
        Ok(())
    }

    fn get_file_label(&self, path: &Path) -> Result<String> {
        let c_path = c_path(path)?;
        let name = CString::new(SELINUX_XATTR)?;
        let mut buf = vec![0u8; 256];
        // SAFETY: both strings are NUL-terminated and buf is valid for buf.len() bytes.
        let len = unsafe {
            libc::lgetxattr(
                c_path.as_ptr(),
                name.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if len < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENODATA) {
                return Ok(String::new());
            }
            return Err(err).with_context(|| format!("lgetxattr {}", path.display()));
        }
        buf.truncate(len as usize);
        while buf.last() == Some(&0) {
            buf.pop();
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn set_file_label(&self, path: &Path, label: &str) -> Result<()> {
        let c_path = c_path(path)?;
        let name = CString::new(SELINUX_XATTR)?;
        // SAFETY: both strings are NUL-terminated and label outlives the call.
        let ret = unsafe {
            libc::lsetxattr(
                c_path.as_ptr(),
                name.as_ptr(),
                label.as_ptr() as *const libc::c_void,
                label.len(),
                0,
            )
        };
        if ret != 0 {
            return Err(std::io::Error::last_os_error())
                .with_context(|| format!("lsetxattr {} {}", path.display(), label));
        }
        Ok(())
    }

    fn create_image(&self, image: &Path) -> Result<()> {
        common::remove_file_if_exists(image)?;
        let file = fs::File::create(image)
            .with_context(|| format!("Failed to create {}", image.display()))?;
        file.set_len(MODULE_IMAGE_SIZE)?;
        drop(file);
        Cmd::new("mke2fs")
            .args(["-t", "ext4", "-O", "^has_journal", "-F"])
            .arg_path(image)
            .error_msg("Failed to format module image")
            .run()?;
        Ok(())
    }

    fn mount_image(&self, image: &Path, target: &Path) -> Result<()> {
        Cmd::new("mount")
            .args(["-t", "ext4", "-o", "loop,rw"])
            .arg_path(image)
            .arg_path(target)
            .error_msg("failed to mount image")
            .run()?;
        Ok(())
    }

    fn mount_tmpfs(&self, target: &Path) -> Result<()> {
        fs::create_dir_all(target)
            .with_context(|| format!("failed to create directory {}", target.display()))?;
        mount_fs("tmpfs", target, "tmpfs")?;

        let pts = target.join("pts");
        fs::create_dir_all(&pts)
            .with_context(|| format!("failed to create directory {}", pts.display()))?;
        mount_fs("devpts", &pts, "devpts")
    }

    fn set_umask(&self, mask: u32) {
        // SAFETY: umask has no failure mode.
        unsafe {
            libc::umask(mask as libc::mode_t);
        }
    }

    fn has_competing_root(&self) -> bool {
        which::which("magisk").is_ok()
    }

    fn kernel_safe_mode(&self, _credential: &str) -> bool {
        // No supercall channel is available to this binary; the property is
        // the only safe-mode source on the system side.
        false
    }

    fn start_boot_log_capture(&self, log_dir: &Path) -> Result<()> {
        let logcat = log_dir.join("logcat.log");
        Cmd::new("timeout")
            .args(["-s", "9", LOG_CAPTURE_SECS, "logcat", "-b", "main,system,crash", "-f"])
            .arg_path(&logcat)
            .arg("logcatcher-bootlog:S")
            .spawn()?;

        let dmesg = log_dir.join("dmesg.log");
        Cmd::path(&self.busybox)
            .args(["timeout", "-s", "9", LOG_CAPTURE_SECS, "sh", "-c"])
            .args([CAPTURE_TO_FILE, "sh"])
            .arg_path(&dmesg)
            .args(["dmesg", "-w"])
            .spawn()?;
        Ok(())
    }

    fn switch_cgroups(&self, pid: u32) -> Result<()> {
        for group in ["/acct", "/dev/cg2_bpf", "/sys/fs/cgroup"] {
            switch_cgroup(Path::new(group), pid)?;
        }
        if self.getprop("ro.config.per_app_memcg").unwrap_or_default() == "false" {
            switch_cgroup(Path::new("/dev/memcg/apps"), pid)?;
        }
        Ok(())
    }
}

fn mount_fs(source: &str, target: &Path, fstype: &str) -> Result<()> {
    let c_source = CString::new(source)?;
    let c_target = c_path(target)?;
    let c_fstype = CString::new(fstype)?;
    // SAFETY: all pointers are NUL-terminated strings; data is null.
    let ret = unsafe {
        libc::mount(
            c_source.as_ptr(),
            c_target.as_ptr(),
            c_fstype.as_ptr(),
            0,
            std::ptr::null(),
        )
    };
    if ret != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("failed to mount {} on {}", fstype, target.display()));
    }
    Ok(())
}

/// Append `pid` to `<group>/cgroup.procs`; a missing group is skipped.
pub fn switch_cgroup(group: &Path, pid: u32) -> Result<()> {
    let procs = group.join("cgroup.procs");
    if !procs.exists() {
        return Ok(());
    }
    let mut fp = OpenOptions::new()
        .append(true)
        .open(&procs)
        .with_context(|| format!("failed to open {}", procs.display()))?;
    writeln!(fp, "{}", pid).with_context(|| format!("failed to write pid to {}", procs.display()))?;
    Ok(())
}
