//! I/O helpers: configuration, scenarios, prompts, providers, artifacts.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod artifact;
pub mod config;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod scenario;

/// Write `contents` to a sibling temp file, then rename it over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path
        .file_name()
        .with_context(|| format!("path has no file name {}", path.display()))?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
