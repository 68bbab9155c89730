//! Structural error kinds surfaced by lifecycle operations.
//!
//! Everything else travels as plain `anyhow` context. These kinds are raised
//! through `anyhow` and recovered with `downcast_ref::<ApdError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApdError {
    #[error("module root {} cannot be listed: {source}", path.display())]
    RegistryUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid module: {0}")]
    InvalidModule(String),
    #[error("{0}: illegal file path in archive")]
    PathTraversal(String),
    #[error("module: {0} not found")]
    ModuleNotFound(String),
    #[error("system is still booting (sys.boot_completed != 1)")]
    BootNotReady,
}
