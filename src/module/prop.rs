//! `module.prop` descriptor parsing.
//!
//! One `key=value` pair per line. Both sides are trimmed, the value may
//! itself contain `=`, and the last occurrence of a key wins. Lines without a
//! separator or with an empty key are skipped.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Parse descriptor text into a sorted key/value map.
pub fn parse_props(content: &str) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        props.insert(key.to_string(), value.trim().to_string());
    }
    props
}

/// Read and parse a descriptor file. Invalid UTF-8 is replaced, not fatal.
pub fn read_props(path: &Path) -> Result<BTreeMap<String, String>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(parse_props(&String::from_utf8_lossy(&bytes)))
}
