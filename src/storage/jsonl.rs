//! JSONL task source
//!
//! One `TaskRecord` JSON object per line. Blank lines are skipped. Uses file
//! locking for concurrent access safety.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::source::{TaskLoader, TaskWriter};
use super::{read_locked, write_atomic};
use crate::domain::{Task, TaskRecord};

#[derive(Debug, Clone)]
pub struct JsonlSource {
    path: PathBuf,
}

impl JsonlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskLoader for JsonlSource {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        let Some(content) = read_locked(&self.path)? else {
            return Ok(Vec::new());
        };

        let mut records = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            let record: TaskRecord = serde_json::from_str(line).with_context(|| {
                format!(
                    "Failed to parse task at {}:{}",
                    self.path.display(),
                    line_num + 1
                )
            })?;
            records.push(record);
        }

        debug!(path = %self.path.display(), count = records.len(), "loaded JSONL tasks");
        Ok(records)
    }
}

impl TaskWriter for JsonlSource {
    /// Full rewrite, in the order given
    fn save_tasks(&self, tasks: &[&Task]) -> Result<()> {
        let mut out = String::new();
        for task in tasks {
            let line = serde_json::to_string(&TaskRecord::from(*task))
                .context("Failed to serialize task")?;
            out.push_str(&line);
            out.push('\n');
        }

        write_atomic(&self.path, &out)?;
        debug!(path = %self.path.display(), count = tasks.len(), "saved JSONL tasks");
        Ok(())
    }
}
