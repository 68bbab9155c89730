//! Module registry: a stateless query object over the module root.
//!
//! Nothing is cached. Every call re-reads the directory tree, so marker files
//! on disk are the only state and repeated calls see the same thing.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::prop;
use crate::common;
use crate::config::{
    Config, DISABLE_FILE, MODULE_ACTION_SH, MODULE_PROP, MODULE_WEB_DIR, REMOVE_FILE, UPDATE_FILE,
};
use crate::error::ApdError;
use crate::report::Failure;

/// Flags derived purely from file presence in a module directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModuleFlags {
    pub disabled: bool,
    pub pending_update: bool,
    pub pending_removal: bool,
    pub has_web_ui: bool,
    pub has_action_script: bool,
}

impl ModuleFlags {
    pub fn read(dir: &Path) -> Self {
        Self {
            disabled: dir.join(DISABLE_FILE).exists(),
            pending_update: dir.join(UPDATE_FILE).exists(),
            pending_removal: dir.join(REMOVE_FILE).exists(),
            has_web_ui: dir.join(MODULE_WEB_DIR).exists(),
            has_action_script: dir.join(MODULE_ACTION_SH).exists(),
        }
    }
}

/// One installed module as seen on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Directory name under the module root.
    pub dir_name: String,
    pub path: PathBuf,
    /// Descriptor fields; `id` is always present.
    pub props: BTreeMap<String, String>,
    /// True when the descriptor had no id and the directory name was used.
    pub id_from_dir: bool,
    pub flags: ModuleFlags,
}

impl Module {
    pub fn id(&self) -> &str {
        self.props
            .get("id")
            .map(String::as_str)
            .unwrap_or(&self.dir_name)
    }

    /// Active modules take part in staged execution.
    pub fn is_active(&self) -> bool {
        !self.flags.disabled
    }

    /// Descriptor fields plus the derived flags as one flat record.
    pub fn to_record(&self) -> BTreeMap<String, String> {
        let mut record = self.props.clone();
        let flags = [
            ("enabled", !self.flags.disabled),
            ("update", self.flags.pending_update),
            ("remove", self.flags.pending_removal),
            ("web", self.flags.has_web_ui),
            ("action", self.flags.has_action_script),
        ];
        for (key, value) in flags {
            record.insert(key.to_string(), value.to_string());
        }
        record
    }
}

pub struct Registry {
    root: PathBuf,
    /// Global update marker touched whenever the set of active modules changes.
    update_flag: Option<PathBuf>,
}

impl Registry {
    /// Registry over `root` that does not track the overlay image.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            update_flag: None,
        }
    }

    /// Registry over the configured module root. Enabling or disabling a
    /// module marks the image for rebuild.
    pub fn from_config(config: &Config) -> Self {
        Self {
            root: config.module_dir.clone(),
            update_flag: Some(config.update_flag()),
        }
    }

    fn mark_update(&self) -> Result<()> {
        match &self.update_flag {
            Some(flag) => common::ensure_file_exists(flag),
            None => Ok(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Module directories (name, path), sorted by name.
    pub fn module_dirs(&self) -> Result<Vec<(String, PathBuf)>> {
        let entries = fs::read_dir(&self.root).map_err(|source| ApdError::RegistryUnavailable {
            path: self.root.clone(),
            source,
        })?;

        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| ApdError::RegistryUnavailable {
                path: self.root.clone(),
                source,
            })?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
        dirs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(dirs)
    }

    /// All modules with a descriptor, with derived flags.
    pub fn list(&self) -> Result<Vec<Module>> {
        let mut modules = Vec::new();
        for (dir_name, path) in self.module_dirs()? {
            let prop_path = path.join(MODULE_PROP);
            if !prop_path.exists() {
                log::debug!("{} has no {}, skipping", path.display(), MODULE_PROP);
                continue;
            }
            let mut props = match prop::read_props(&prop_path) {
                Ok(props) => props,
                Err(e) => {
                    log::warn!("Failed to parse {}: {:#}", prop_path.display(), e);
                    continue;
                }
            };

            let id_from_dir = props.get("id").map_or(true, |id| id.is_empty());
            if id_from_dir {
                log::info!("Use dir name as module id: {}", dir_name);
                props.insert("id".to_string(), dir_name.clone());
            }

            modules.push(Module {
                flags: ModuleFlags::read(&path),
                dir_name,
                path,
                props,
                id_from_dir,
            });
        }
        Ok(modules)
    }

    /// Visit every module directory without a disable marker, in name order.
    ///
    /// Stops at, and returns, the first error from `visitor`.
    pub fn for_each_active<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&Path) -> Result<()>,
    {
        for (_, path) in self.module_dirs()? {
            if path.join(DISABLE_FILE).exists() {
                continue;
            }
            visitor(&path)?;
        }
        Ok(())
    }

    /// Path of a module directory, which must exist.
    pub fn module_path(&self, id: &str) -> Result<PathBuf> {
        // An id is a single path component; anything else cannot name a module.
        let valid = !id.is_empty() && id != "." && id != ".." && !id.contains('/');
        let path = self.root.join(id);
        if !valid || !path.is_dir() {
            return Err(ApdError::ModuleNotFound(id.to_string()).into());
        }
        Ok(path)
    }

    /// Create or remove the module's disable marker. Repeating is a no-op.
    pub fn set_disabled(&self, id: &str, disabled: bool) -> Result<()> {
        let marker = self.module_path(id)?.join(DISABLE_FILE);
        if marker.exists() == disabled {
            return Ok(());
        }
        if disabled {
            common::ensure_file_exists(&marker)?;
        } else {
            common::remove_file_if_exists(&marker)?;
        }
        self.mark_update()
    }

    /// Disable every module, continuing past individual failures.
    pub fn disable_all(&self) -> Result<Vec<Failure>> {
        let mut failures = Vec::new();
        let mut changed = false;
        for (dir_name, path) in self.module_dirs()? {
            let marker = path.join(DISABLE_FILE);
            if marker.exists() {
                continue;
            }
            match common::ensure_file_exists(&marker) {
                Ok(()) => changed = true,
                Err(e) => {
                    log::warn!("Failed to disable module {}: {:#}", path.display(), e);
                    failures.push(Failure::new(dir_name, e));
                }
            }
        }
        if changed {
            if let Err(e) = self.mark_update() {
                failures.push(Failure::new("update flag", e));
            }
        }
        Ok(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn module(root: &Path, dir: &str, prop: &str) -> PathBuf {
        let path = root.join(dir);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join(MODULE_PROP), prop).unwrap();
        path
    }

    #[test]
    fn test_missing_root_is_unavailable() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::new(&temp.path().join("nope"));
        let err = registry.list().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApdError>(),
            Some(ApdError::RegistryUnavailable { .. })
        ));
    }

    #[test]
    fn test_id_substituted_from_dir() {
        let temp = TempDir::new().unwrap();
        module(temp.path(), "nameless", "name=No Id\n");
        let modules = Registry::new(temp.path()).list().unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].id(), "nameless");
        assert!(modules[0].id_from_dir);
    }

    #[test]
    fn test_flags_from_markers() {
        let temp = TempDir::new().unwrap();
        let path = module(temp.path(), "m", "id=m\n");
        fs::write(path.join(REMOVE_FILE), "").unwrap();
        fs::create_dir(path.join(MODULE_WEB_DIR)).unwrap();

        let record = Registry::new(temp.path()).list().unwrap()[0].to_record();
        assert_eq!(record["enabled"], "true");
        assert_eq!(record["remove"], "true");
        assert_eq!(record["web"], "true");
        assert_eq!(record["update"], "false");
        assert_eq!(record["action"], "false");
    }

    #[test]
    fn test_files_in_root_are_ignored() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("stray.txt"), "id=stray").unwrap();
        module(temp.path(), "real", "id=real\n");
        let modules = Registry::new(temp.path()).list().unwrap();
        assert_eq!(modules.len(), 1);
    }

    #[test]
    fn test_module_path_rejects_escapes() {
        let temp = TempDir::new().unwrap();
        let registry = Registry::new(&temp.path().join("modules"));
        fs::create_dir_all(registry.root()).unwrap();
        for id in ["..", ".", "", "a/b"] {
            assert!(registry.module_path(id).is_err(), "{id:?} accepted");
        }
    }
}
