//! Shared filesystem helpers.

pub mod files;
pub mod paths;

pub use files::{ensure_file_exists, is_executable, remove_file_if_exists, set_mode};
pub use paths::{ensure_clean_dir, ensure_dir_exists, first_existing, remove_dir_if_exists};
