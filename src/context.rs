//! Context shared by every lifecycle and stage operation.

use crate::config::Config;
use crate::platform::Platform;

/// Paths plus the OS primitives to act on them.
///
/// Holds no module state: every operation re-reads the filesystem.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub config: &'a Config,
    pub platform: &'a dyn Platform,
}

impl<'a> Context<'a> {
    pub fn new(config: &'a Config, platform: &'a dyn Platform) -> Self {
        Self { config, platform }
    }
}
