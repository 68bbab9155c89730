//! CLI command handlers.
//!
//! - `module` - install, list, enable, disable, disable-all
//! - `event` - boot event triggers (post-fs-data, services, boot-completed)

pub mod event;
pub mod module;

pub use event::{cmd_event, BootEvent};
pub use module::{cmd_module, list_records, ModuleCommand};
