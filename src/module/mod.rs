//! Installed modules: registry queries, installation, and pruning.
//!
//! A module is a directory under the module root. Its descriptor lives in
//! `module.prop`; its state is nothing more than which marker files exist.

pub mod install;
pub mod prop;
pub mod prune;
pub mod registry;

pub use install::{install_module, InstallReport};
pub use prune::prune_modules;
pub use registry::{Module, ModuleFlags, Registry};
