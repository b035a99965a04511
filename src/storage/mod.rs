//! # Storage Layer
//!
//! Loaders and writers for task corpora, plus project configuration.
//!
//! ## Source Formats
//!
//! | Format | Shape | Default location |
//! |--------|-------|------------------|
//! | JSONL | one `TaskRecord` per line | `.tasks/tasks.jsonl` |
//! | YAML | sequence of `TaskRecord`s | configured via `source` |
//! | Org | outline headings + property drawers | configured via `source` |
//! | Config | TOML | `.tasks/config.toml` |
//!
//! ## Concurrency Safety
//!
//! - Reads take a shared `fs2` lock, writes an exclusive one
//! - All writes are atomic (temp file + rename)
//!
//! ## Project Structure
//!
//! ```text
//! .tasks/
//! ├── config.toml    # Project configuration
//! └── tasks.jsonl    # Default task source
//! ```

mod config;
mod jsonl;
mod org;
mod project;
mod source;
mod yaml;

pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig};
pub use jsonl::JsonlSource;
pub use org::OrgSource;
pub use project::{Project, ProjectError};
pub use source::{SourceFormat, TaskLoader, TaskSource, TaskWriter};
pub use yaml::YamlSource;

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use fs2::FileExt;

/// Reads a whole file under a shared lock; a missing file reads as `None`
pub(crate) fn read_locked(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path)
        .with_context(|| format!("Failed to open task source: {}", path.display()))?;

    file.lock_shared()
        .context("Failed to acquire read lock on task source")?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .with_context(|| format!("Failed to read task source: {}", path.display()))?;

    // Lock is released when file is dropped
    Ok(Some(content))
}

/// Replaces a file's contents via a locked temp file and an atomic rename
pub(crate) fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let mut temp_name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        file.lock_exclusive()
            .context("Failed to acquire write lock on task source")?;

        file.write_all(content.as_bytes())
            .context("Failed to write task source")?;
        file.flush().context("Failed to flush task source")?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}
