//! Task domain model
//!
//! Tasks are the units of work in the corpus. Leaf tasks carry a lifecycle
//! state; container nodes (projects) group children and have no state of
//! their own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::id::TaskId;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    #[default]
    Todo,
    Next,
    #[serde(alias = "IN-PROGRESS")]
    InProgress,
    Done,
    Cancelled,
}

impl TaskState {
    /// All states, in lifecycle order
    pub const ALL: [TaskState; 5] = [
        TaskState::Todo,
        TaskState::Next,
        TaskState::InProgress,
        TaskState::Done,
        TaskState::Cancelled,
    ];

    /// Returns true if `to` is reachable from this state in one step
    pub fn can_transition_to(self, to: TaskState) -> bool {
        use TaskState::*;

        matches!(
            (self, to),
            (Todo, Next)
                | (Todo, InProgress)
                | (Todo, Cancelled)
                | (Next, InProgress)
                | (Next, Cancelled)
                | (InProgress, Done)
                | (InProgress, Cancelled)
        )
    }

    /// Open states are the ones a leaf task can be picked up from
    pub fn is_open(self) -> bool {
        matches!(self, TaskState::Todo | TaskState::Next)
    }

    /// Returns true for the terminal states
    pub fn is_closed(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Cancelled)
    }

    /// Keyword used in declarations and documents
    pub fn keyword(self) -> &'static str {
        match self {
            TaskState::Todo => "TODO",
            TaskState::Next => "NEXT",
            TaskState::InProgress => "IN_PROGRESS",
            TaskState::Done => "DONE",
            TaskState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.keyword())
    }
}

/// Error returned when a state keyword is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown task state '{0}' (expected TODO, NEXT, IN_PROGRESS, DONE or CANCELLED)")]
pub struct UnknownState(pub String);

impl FromStr for TaskState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TODO" => Ok(TaskState::Todo),
            "NEXT" => Ok(TaskState::Next),
            "IN_PROGRESS" | "IN-PROGRESS" => Ok(TaskState::InProgress),
            "DONE" => Ok(TaskState::Done),
            "CANCELLED" => Ok(TaskState::Cancelled),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Priority as written in the source: a letter (`A`) or a number (`2`)
///
/// Both forms share one rank space, so `A` and `0` rank the same and lower
/// ranks sort first. The written form is kept for saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Priority {
    /// `A` to `Z`, held as rank 0 to 25
    Letter(u8),
    Number(u8),
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Letter(rank) | Priority::Number(rank) => rank,
        }
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        let key = |p: &Priority| (p.rank(), matches!(p, Priority::Number(_)));
        key(self).cmp(&key(other))
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Priority::Letter(rank) if rank < 26 => write!(f, "{}", (b'A' + rank) as char),
            Priority::Letter(rank) | Priority::Number(rank) => write!(f, "{}", rank),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().trim_start_matches('#');
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_uppercase() => Ok(Priority::Letter(c as u8 - b'A')),
            _ => s
                .parse::<u8>()
                .map(Priority::Number)
                .map_err(|_| format!("Invalid priority '{}': expected A-Z or a number", s)),
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        p.to_string()
    }
}

/// A task record as supplied by a loader
///
/// This is the only contract between source documents and the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,

    #[serde(default)]
    pub heading: String,

    /// Absent for container nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TaskState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,

    /// Explicitly marked as a grouping node
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub container: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    /// Creates a leaf record in the `TODO` state
    pub fn new(id: TaskId, heading: impl Into<String>) -> Self {
        Self {
            id,
            heading: heading.into(),
            state: Some(TaskState::Todo),
            parent_id: None,
            priority: None,
            blocker: None,
            trigger: None,
            tags: Vec::new(),
            properties: BTreeMap::new(),
            container: false,
            closed_at: None,
        }
    }

    /// Creates a container record (no state)
    pub fn container(id: TaskId, heading: impl Into<String>) -> Self {
        Self {
            state: None,
            container: true,
            ..Self::new(id, heading)
        }
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_parent(mut self, parent: TaskId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_blocker(mut self, blocker: impl Into<String>) -> Self {
        self.blocker = Some(blocker.into());
        self
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A task held by the store
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// Display text
    pub heading: String,

    /// Lifecycle state; `None` for containers
    pub state: Option<TaskState>,

    pub priority: Option<Priority>,

    pub parent_id: Option<TaskId>,

    /// Raw blocker declaration
    pub blocker: Option<String>,

    /// Raw trigger declaration
    pub trigger: Option<String>,

    pub tags: BTreeSet<String>,

    pub properties: BTreeMap<String, String>,

    pub container: bool,

    /// When the task reached DONE or CANCELLED
    pub closed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns true if this node is a grouping node with no lifecycle state
    pub fn is_container(&self) -> bool {
        self.container || self.state.is_none()
    }

    /// Returns the value of a property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns true if the task has a blocker declaration with content
    pub fn has_blocker(&self) -> bool {
        self.blocker.as_deref().is_some_and(|b| !b.trim().is_empty())
    }
}

impl From<TaskRecord> for Task {
    fn from(record: TaskRecord) -> Self {
        let state = if record.container { None } else { record.state };

        Self {
            id: record.id,
            heading: record.heading,
            state,
            priority: record.priority,
            parent_id: record.parent_id,
            blocker: record.blocker.filter(|b| !b.trim().is_empty()),
            trigger: record.trigger.filter(|t| !t.trim().is_empty()),
            tags: record.tags.into_iter().collect(),
            properties: record.properties,
            container: record.container,
            closed_at: record.closed_at,
        }
    }
}

impl From<&Task> for TaskRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            heading: task.heading.clone(),
            state: task.state,
            parent_id: task.parent_id.clone(),
            priority: task.priority,
            blocker: task.blocker.clone(),
            trigger: task.trigger.clone(),
            tags: task.tags.iter().cloned().collect(),
            properties: task.properties.clone(),
            container: task.container,
            closed_at: task.closed_at,
        }
    }
}
