//! YAML task source: a single sequence of task records

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::source::{TaskLoader, TaskWriter};
use super::{read_locked, write_atomic};
use crate::domain::{Task, TaskRecord};

#[derive(Debug, Clone)]
pub struct YamlSource {
    path: PathBuf,
}

impl YamlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskLoader for YamlSource {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        let content = match read_locked(&self.path)? {
            Some(content) if !content.trim().is_empty() => content,
            _ => return Ok(Vec::new()),
        };

        let records: Vec<TaskRecord> = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML tasks: {}", self.path.display()))?;

        debug!(path = %self.path.display(), count = records.len(), "loaded YAML tasks");
        Ok(records)
    }
}

impl TaskWriter for YamlSource {
    fn save_tasks(&self, tasks: &[&Task]) -> Result<()> {
        let records: Vec<TaskRecord> = tasks.iter().map(|t| TaskRecord::from(*t)).collect();
        let content = serde_yaml::to_string(&records).context("Failed to serialize tasks")?;
        write_atomic(&self.path, &content)
    }
}
