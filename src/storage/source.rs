//! Loader and writer seams
//!
//! The engine only sees `TaskRecord`s. Anything that can produce them is a
//! [`TaskLoader`]; anything that can persist the engine's tasks back is a
//! [`TaskWriter`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{JsonlSource, OrgSource, YamlSource};
use crate::domain::{Task, TaskRecord};

pub trait TaskLoader {
    /// Reads every task record, in declaration order
    fn load_tasks(&self) -> Result<Vec<TaskRecord>>;
}

pub trait TaskWriter {
    /// Persists the given tasks
    fn save_tasks(&self, tasks: &[&Task]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Jsonl,
    Org,
    Yaml,
}

impl SourceFormat {
    /// Guesses the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "jsonl" | "ndjson" => Some(SourceFormat::Jsonl),
            "org" => Some(SourceFormat::Org),
            "yaml" | "yml" => Some(SourceFormat::Yaml),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Jsonl => f.write_str("jsonl"),
            SourceFormat::Org => f.write_str("org"),
            SourceFormat::Yaml => f.write_str("yaml"),
        }
    }
}

impl FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jsonl" => Ok(SourceFormat::Jsonl),
            "org" => Ok(SourceFormat::Org),
            "yaml" | "yml" => Ok(SourceFormat::Yaml),
            other => Err(format!("Unknown source format: {}", other)),
        }
    }
}

/// A task source file in one of the supported formats
#[derive(Debug, Clone)]
pub enum TaskSource {
    Jsonl(JsonlSource),
    Org(OrgSource),
    Yaml(YamlSource),
}

impl TaskSource {
    /// Opens `path` as `format`, or as whatever its extension suggests
    /// (JSONL when unknown)
    pub fn new(path: impl Into<PathBuf>, format: Option<SourceFormat>) -> Self {
        let path = path.into();
        let format = format
            .or_else(|| SourceFormat::from_path(&path))
            .unwrap_or(SourceFormat::Jsonl);

        match format {
            SourceFormat::Jsonl => TaskSource::Jsonl(JsonlSource::new(path)),
            SourceFormat::Org => TaskSource::Org(OrgSource::new(path)),
            SourceFormat::Yaml => TaskSource::Yaml(YamlSource::new(path)),
        }
    }

    pub fn format(&self) -> SourceFormat {
        match self {
            TaskSource::Jsonl(_) => SourceFormat::Jsonl,
            TaskSource::Org(_) => SourceFormat::Org,
            TaskSource::Yaml(_) => SourceFormat::Yaml,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            TaskSource::Jsonl(s) => s.path(),
            TaskSource::Org(s) => s.path(),
            TaskSource::Yaml(s) => s.path(),
        }
    }
}

impl TaskLoader for TaskSource {
    fn load_tasks(&self) -> Result<Vec<TaskRecord>> {
        match self {
            TaskSource::Jsonl(s) => s.load_tasks(),
            TaskSource::Org(s) => s.load_tasks(),
            TaskSource::Yaml(s) => s.load_tasks(),
        }
    }
}

impl TaskWriter for TaskSource {
    fn save_tasks(&self, tasks: &[&Task]) -> Result<()> {
        match self {
            TaskSource::Jsonl(s) => s.save_tasks(tasks),
            TaskSource::Org(s) => s.save_tasks(tasks),
            TaskSource::Yaml(s) => s.save_tasks(tasks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(SourceFormat::from_path(Path::new("a/tasks.jsonl")), Some(SourceFormat::Jsonl));
        assert_eq!(SourceFormat::from_path(Path::new("plan.ORG")), Some(SourceFormat::Org));
        assert_eq!(SourceFormat::from_path(Path::new("t.yml")), Some(SourceFormat::Yaml));
        assert_eq!(SourceFormat::from_path(Path::new("README")), None);
    }

    #[test]
    fn explicit_format_wins() {
        let source = TaskSource::new("tasks.txt", Some(SourceFormat::Org));
        assert_eq!(source.format(), SourceFormat::Org);

        let source = TaskSource::new("tasks.txt", None);
        assert_eq!(source.format(), SourceFormat::Jsonl);
    }

    #[test]
    fn parse_format_names() {
        assert_eq!("YAML".parse::<SourceFormat>(), Ok(SourceFormat::Yaml));
        assert!("csv".parse::<SourceFormat>().is_err());
    }
}
