//! apd library exports.
//!
//! The binary is a thin CLI over these modules; tests drive them directly
//! with a temporary layout and a fake [`platform::Platform`].

pub mod commands;
pub mod common;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod module;
pub mod overlay;
pub mod platform;
pub mod process;
pub mod report;
pub mod restorecon;
pub mod scripts;
pub mod stage;

pub use config::Config;
pub use context::Context;
pub use error::ApdError;
