//! Configuration loading from the environment.

use apd::config::{Config, DEFAULT_ADB_DIR, DEFAULT_SHELL};
use serial_test::serial;
use std::path::Path;

fn clear_env() {
    std::env::remove_var("APD_ADB_DIR");
    std::env::remove_var("APD_SHELL");
}

#[test]
#[serial]
fn test_defaults() {
    clear_env();
    let config = Config::load();
    assert_eq!(config.adb_dir, Path::new(DEFAULT_ADB_DIR));
    assert_eq!(config.shell, Path::new(DEFAULT_SHELL));
    assert_eq!(config.module_dir, Path::new("/data/adb/modules"));
    assert_eq!(config.module_update_dir, Path::new("/data/adb/modules_update"));
    assert_eq!(config.daemon_path, Path::new("/data/adb/apd"));
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    std::env::set_var("APD_ADB_DIR", "/tmp/apd-root");
    std::env::set_var("APD_SHELL", "/bin/sh");

    let config = Config::load();
    clear_env();

    assert_eq!(config.module_dir, Path::new("/tmp/apd-root/modules"));
    assert_eq!(config.busybox(), Path::new("/tmp/apd-root/ap/bin/busybox"));
    assert_eq!(
        config.common_script_dir("service"),
        Path::new("/tmp/apd-root/service.d")
    );
    assert_eq!(config.shell, Path::new("/bin/sh"));
}
