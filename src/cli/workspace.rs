//! Locating and loading the task corpus for a command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::domain::{Engine, Task};
use crate::storage::{Project, SourceFormat, TaskLoader, TaskSource, TaskWriter};

/// The task source a command works on
pub struct Workspace {
    source: TaskSource,
    write_back: bool,
}

impl Workspace {
    /// Uses `file` when given, otherwise the enclosing project's source
    pub fn open(file: Option<&Path>, format: Option<SourceFormat>) -> Result<Self> {
        match file {
            Some(path) => Ok(Self {
                source: TaskSource::new(PathBuf::from(path), format),
                write_back: true,
            }),
            None => {
                let project = Project::open_current()?;
                let source = match format {
                    Some(format) => TaskSource::new(project.source().path(), Some(format)),
                    None => project.source(),
                };
                Ok(Self {
                    source,
                    write_back: project.config().project.write_back,
                })
            }
        }
    }

    pub fn source(&self) -> &TaskSource {
        &self.source
    }

    /// Loads every record and builds the engine
    pub fn load_engine(&self) -> Result<Engine> {
        let path = self.source.path();
        let records = self.source.load_tasks()?;
        debug!(path = %path.display(), format = %self.source.format(), count = records.len(), "loaded corpus");

        Engine::new(records).with_context(|| format!("Invalid task corpus in {}", path.display()))
    }

    /// Writes the engine's tasks back unless `write_back` is off
    pub fn save(&self, engine: &Engine) -> Result<()> {
        if !self.write_back {
            debug!("write_back disabled, not saving");
            return Ok(());
        }

        let tasks: Vec<&Task> = engine.store().all().collect();
        self.source
            .save_tasks(&tasks)
            .with_context(|| format!("Failed to save tasks to {}", self.source.path().display()))
    }
}
