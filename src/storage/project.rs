//! Project management
//!
//! Handles project initialization and provides access to the task source.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::info;

use super::{Config, TaskSource};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Not in a task-graph project. Run 'tasks init' first.")]
    NotInProject,
}

const DEFAULT_CONFIG: &str = r#"# task-graph configuration

# Task source, relative to the project root
source = ".tasks/tasks.jsonl"

# Source format: "jsonl", "org" or "yaml" (inferred from the extension if unset)
# format = "org"

# Persist transitions back to the source
write_back = true
"#;

/// A task-graph project
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing project at the given path
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        if !root.join(".tasks").is_dir() {
            return Err(ProjectError::NotInProject.into());
        }

        let config = Config::for_project(&root)?;

        Ok(Self { root, config })
    }

    /// Opens the project at the current directory or a parent
    pub fn open_current() -> Result<Self> {
        let root = Config::find_project_root().ok_or(ProjectError::NotInProject)?;

        Self::open(root)
    }

    /// Initializes a project at the given path; existing files are kept
    pub fn init(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let tasks_dir = root.join(".tasks");

        fs::create_dir_all(&tasks_dir).with_context(|| {
            format!("Failed to create .tasks directory: {}", tasks_dir.display())
        })?;

        let config_path = tasks_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        let project = Self::open(root)?;

        let source = project.source();
        if !source.path().exists() {
            if let Some(parent) = source.path().parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            fs::write(source.path(), "").with_context(|| {
                format!("Failed to create task source: {}", source.path().display())
            })?;
        }

        info!(root = %project.root.display(), "project initialized");
        Ok(project)
    }

    /// Returns the project root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the .tasks directory path
    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(".tasks")
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the configured task source
    pub fn source(&self) -> TaskSource {
        self.config.project.task_source(&self.root)
    }
}
