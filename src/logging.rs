//! Process logging bootstrap.
//!
//! apd logs to stderr; during boot, init routes that into the system log.
//! The level comes from `APD_LOG` and defaults per build mode.

use anyhow::{Context, Result};
use flexi_logger::{Logger, LoggerHandle};

/// Environment variable holding a log spec such as `debug` or `apd=trace`.
pub const LOG_ENV: &str = "APD_LOG";

/// Returns the default log level for the current build mode.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

/// Start the logger. Keep the returned handle alive for the whole process.
pub fn init_logging() -> Result<LoggerHandle> {
    let spec = std::env::var(LOG_ENV).unwrap_or_else(|_| default_log_level().to_string());
    Logger::try_with_str(&spec)
        .with_context(|| format!("invalid log spec `{}`", spec))?
        .log_to_stderr()
        .format(flexi_logger::detailed_format)
        .start()
        .context("failed to start logger")
}
