//! In-memory task store
//!
//! The store is the single owner of all task records. It keeps tasks in
//! declaration order and indexes the hierarchy so parent, child and sibling
//! lookups are constant time. `set_state` and `set_property` are the only
//! mutation entry points.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use thiserror::Error;

use super::id::TaskId;
use super::task::{Task, TaskRecord, TaskState};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Unknown task id: {0}")]
    UnknownTaskId(TaskId),

    #[error("Duplicate task id: {0}")]
    DuplicateId(TaskId),

    #[error("Task {task} names unknown parent {parent}")]
    UnknownParent { task: TaskId, parent: TaskId },

    #[error("Parent chain of {0} loops back on itself")]
    ParentCycle(TaskId),

    #[error("Task {task} cannot move from {from} to {to}")]
    InvalidState {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task {0} is a container and has no settable state")]
    NoState(TaskId),
}

/// Authoritative map of `id -> Task` with a hierarchy index
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: HashMap<TaskId, Task>,
    /// Declaration order
    order: Vec<TaskId>,
    children: HashMap<TaskId, Vec<TaskId>>,
    roots: Vec<TaskId>,
}

impl TaskStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from loader records
    pub fn from_records(records: impl IntoIterator<Item = TaskRecord>) -> Result<Self, StoreError> {
        let mut store = Self::new();

        for record in records {
            let task = Task::from(record);
            if store.tasks.contains_key(&task.id) {
                return Err(StoreError::DuplicateId(task.id));
            }
            store.order.push(task.id.clone());
            store.tasks.insert(task.id.clone(), task);
        }

        for id in &store.order {
            let task = &store.tasks[id];
            match &task.parent_id {
                Some(parent) => {
                    if !store.tasks.contains_key(parent) {
                        return Err(StoreError::UnknownParent {
                            task: id.clone(),
                            parent: parent.clone(),
                        });
                    }
                    store
                        .children
                        .entry(parent.clone())
                        .or_default()
                        .push(id.clone());
                }
                None => store.roots.push(id.clone()),
            }
        }

        store.check_parent_chains()?;

        // A stateless leaf that is not marked as a container starts as TODO
        let stateless: Vec<TaskId> = store
            .all()
            .filter(|t| t.state.is_none() && !t.container && store.is_leaf(&t.id))
            .map(|t| t.id.clone())
            .collect();
        for id in stateless {
            if let Some(task) = store.tasks.get_mut(&id) {
                task.state = Some(TaskState::Todo);
            }
        }

        Ok(store)
    }

    fn check_parent_chains(&self) -> Result<(), StoreError> {
        for id in &self.order {
            let mut seen = HashSet::new();
            let mut current = Some(id);
            while let Some(node) = current {
                if !seen.insert(node) {
                    return Err(StoreError::ParentCycle(id.clone()));
                }
                current = self.tasks.get(node).and_then(|t| t.parent_id.as_ref());
            }
        }
        Ok(())
    }

    /// Returns a task by ID
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Returns a task by ID or `UnknownTaskId`
    pub fn require(&self, id: &TaskId) -> Result<&Task, StoreError> {
        self.tasks
            .get(id)
            .ok_or_else(|| StoreError::UnknownTaskId(id.clone()))
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    /// Iterates over all tasks in declaration order
    pub fn all(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct child IDs in declaration order
    pub fn child_ids(&self, id: &TaskId) -> &[TaskId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct children in declaration order
    pub fn children_of(&self, id: &TaskId) -> Vec<&Task> {
        self.child_ids(id)
            .iter()
            .filter_map(|c| self.tasks.get(c))
            .collect()
    }

    /// Top-level tasks in declaration order
    pub fn roots(&self) -> &[TaskId] {
        &self.roots
    }

    /// Returns true if the task has no children
    pub fn is_leaf(&self, id: &TaskId) -> bool {
        self.child_ids(id).is_empty()
    }

    /// The sibling group a task belongs to (including itself)
    pub fn sibling_group(&self, id: &TaskId) -> &[TaskId] {
        match self.tasks.get(id).and_then(|t| t.parent_id.as_ref()) {
            Some(parent) => self.child_ids(parent),
            None => &self.roots,
        }
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self, id: &TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut current = self.tasks.get(id).and_then(|t| t.parent_id.clone());
        while let Some(parent) = current {
            current = self.tasks.get(&parent).and_then(|t| t.parent_id.clone());
            out.push(parent);
        }
        out
    }

    /// All descendants in pre-order
    pub fn descendants(&self, id: &TaskId) -> Vec<TaskId> {
        let mut out = Vec::new();
        let mut stack: Vec<&TaskId> = self.child_ids(id).iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node.clone());
            stack.extend(self.child_ids(node).iter().rev());
        }
        out
    }

    /// State as seen by conditions
    ///
    /// Containers read as DONE once they have children and every child reads
    /// as closed; otherwise as TODO.
    pub fn derived_state(&self, id: &TaskId) -> Option<TaskState> {
        let task = self.tasks.get(id)?;
        if let Some(state) = task.state {
            return Some(state);
        }

        let children = self.child_ids(id);
        let all_closed = !children.is_empty()
            && children
                .iter()
                .all(|c| self.derived_state(c).is_some_and(TaskState::is_closed));

        Some(if all_closed {
            TaskState::Done
        } else {
            TaskState::Todo
        })
    }

    /// Applies a state change, enforcing the lifecycle state machine
    pub fn set_state(&mut self, id: &TaskId, new_state: TaskState) -> Result<(), StoreError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownTaskId(id.clone()))?;

        let from = match task.state {
            Some(state) if !task.container => state,
            _ => return Err(StoreError::NoState(id.clone())),
        };

        if !from.can_transition_to(new_state) {
            return Err(StoreError::InvalidState {
                task: id.clone(),
                from,
                to: new_state,
            });
        }

        task.state = Some(new_state);
        if new_state.is_closed() {
            task.closed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Sets a property value; returns the previous value
    pub fn set_property(
        &mut self,
        id: &TaskId,
        name: &str,
        value: &str,
    ) -> Result<Option<String>, StoreError> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownTaskId(id.clone()))?;

        Ok(task.properties.insert(name.to_string(), value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn sample() -> TaskStore {
        TaskStore::from_records([
            TaskRecord::container(id("P"), "Project"),
            TaskRecord::new(id("A"), "a").with_parent(id("P")),
            TaskRecord::new(id("B"), "b").with_parent(id("P")),
            TaskRecord::new(id("C"), "c").with_parent(id("P")),
            TaskRecord::new(id("B1"), "b1").with_parent(id("B")),
            TaskRecord::new(id("Z"), "standalone"),
        ])
        .unwrap()
    }

    #[test]
    fn hierarchy_index() {
        let store = sample();

        assert_eq!(store.len(), 6);
        assert_eq!(store.child_ids(&id("P")), &[id("A"), id("B"), id("C")]);
        assert_eq!(store.roots(), &[id("P"), id("Z")]);
        assert!(store.is_leaf(&id("A")));
        assert!(!store.is_leaf(&id("B")));
        assert_eq!(store.children_of(&id("B"))[0].heading, "b1");
    }

    #[test]
    fn declaration_order_is_kept() {
        let store = sample();
        let ids: Vec<_> = store.all().map(|t| t.id.to_string()).collect();
        assert_eq!(ids, ["P", "A", "B", "C", "B1", "Z"]);
    }

    #[test]
    fn ancestors_and_descendants() {
        let store = sample();

        assert_eq!(store.ancestors(&id("B1")), vec![id("B"), id("P")]);
        assert_eq!(
            store.descendants(&id("P")),
            vec![id("A"), id("B"), id("B1"), id("C")]
        );
        assert!(store.ancestors(&id("Z")).is_empty());
    }

    #[test]
    fn sibling_groups() {
        let store = sample();
        assert_eq!(store.sibling_group(&id("B")), &[id("A"), id("B"), id("C")]);
        assert_eq!(store.sibling_group(&id("Z")), &[id("P"), id("Z")]);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let result = TaskStore::from_records([
            TaskRecord::new(id("A"), "one"),
            TaskRecord::new(id("A"), "two"),
        ]);
        assert_eq!(result.unwrap_err(), StoreError::DuplicateId(id("A")));
    }

    #[test]
    fn unknown_parent_rejected() {
        let result = TaskStore::from_records([TaskRecord::new(id("A"), "a").with_parent(id("NOPE"))]);
        assert!(matches!(result, Err(StoreError::UnknownParent { .. })));
    }

    #[test]
    fn parent_cycle_rejected() {
        let result = TaskStore::from_records([
            TaskRecord::new(id("A"), "a").with_parent(id("B")),
            TaskRecord::new(id("B"), "b").with_parent(id("A")),
        ]);
        assert!(matches!(result, Err(StoreError::ParentCycle(_))));
    }

    #[test]
    fn set_state_follows_state_machine() {
        let mut store = sample();

        store.set_state(&id("A"), TaskState::Next).unwrap();
        store.set_state(&id("A"), TaskState::InProgress).unwrap();

        let err = store.set_state(&id("A"), TaskState::Todo).unwrap_err();
        assert!(matches!(err, StoreError::InvalidState { .. }));

        store.set_state(&id("A"), TaskState::Done).unwrap();
        let task = store.get(&id("A")).unwrap();
        assert_eq!(task.state, Some(TaskState::Done));
        assert!(task.closed_at.is_some());
    }

    #[test]
    fn containers_have_no_settable_state() {
        let mut store = sample();
        assert_eq!(
            store.set_state(&id("P"), TaskState::Next),
            Err(StoreError::NoState(id("P")))
        );
    }

    #[test]
    fn set_state_unknown_id() {
        let mut store = sample();
        assert_eq!(
            store.set_state(&id("MISSING"), TaskState::Next),
            Err(StoreError::UnknownTaskId(id("MISSING")))
        );
    }

    #[test]
    fn container_derived_state() {
        let mut store = sample();
        assert_eq!(store.derived_state(&id("P")), Some(TaskState::Todo));

        for leaf in ["A", "B1", "C"] {
            store.set_state(&id(leaf), TaskState::Cancelled).unwrap();
        }
        // B still has its own state
        assert_eq!(store.derived_state(&id("P")), Some(TaskState::Todo));

        store.set_state(&id("B"), TaskState::InProgress).unwrap();
        store.set_state(&id("B"), TaskState::Done).unwrap();
        assert_eq!(store.derived_state(&id("P")), Some(TaskState::Done));
    }

    #[test]
    fn stateless_leaf_defaults_to_todo() {
        let mut bare = TaskRecord::new(id("A"), "a");
        bare.state = None;
        let mut group = TaskRecord::new(id("G"), "group");
        group.state = None;

        let store = TaskStore::from_records([
            bare,
            group,
            TaskRecord::new(id("C"), "c").with_parent(id("G")),
        ])
        .unwrap();

        assert_eq!(store.get(&id("A")).unwrap().state, Some(TaskState::Todo));
        assert!(store.get(&id("G")).unwrap().is_container());
    }

    #[test]
    fn set_property_returns_previous() {
        let mut store = sample();
        assert_eq!(store.set_property(&id("A"), "OWNER", "me").unwrap(), None);
        assert_eq!(
            store.set_property(&id("A"), "OWNER", "you").unwrap(),
            Some("me".to_string())
        );
        assert_eq!(store.get(&id("A")).unwrap().property("OWNER"), Some("you"));
    }
}
