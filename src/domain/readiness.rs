//! Readiness evaluation
//!
//! A task is actionable right now when it is structurally actionable (a leaf
//! in TODO or NEXT) and every clause of its blocker holds. Effective status is
//! derived from those two checks on every call; nothing here is stored.

use std::fmt;

use serde::Serialize;

use super::expr::{Blocker, Condition, Declarations, ParseError};
use super::graph::resolve_finder;
use super::id::TaskId;
use super::store::TaskStore;
use super::task::{Task, TaskState};

/// Derived display status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub enum EffectiveStatus {
    /// Actionable and every blocker clause holds
    Ready,
    /// Actionable but blocked by at least one clause
    Waiting,
    /// Not actionable: mirrors the raw state
    State(TaskState),
    /// Grouping node without a state
    Container,
}

impl EffectiveStatus {
    pub fn label(self) -> &'static str {
        match self {
            EffectiveStatus::Ready => "READY",
            EffectiveStatus::Waiting => "WAITING",
            EffectiveStatus::State(state) => state.keyword(),
            EffectiveStatus::Container => "PROJECT",
        }
    }
}

impl fmt::Display for EffectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<EffectiveStatus> for String {
    fn from(status: EffectiveStatus) -> Self {
        status.label().to_string()
    }
}

/// A blocker clause that does not currently hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unsatisfied {
    pub clause: String,
    /// Resolved targets failing the condition
    pub targets: Vec<TaskId>,
    /// Referenced IDs that do not exist
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<TaskId>,
}

/// Outcome of evaluating a task's blocker
#[derive(Debug, Clone, PartialEq)]
pub enum BlockerCheck {
    Satisfied,
    Blocked(Vec<Unsatisfied>),
    /// The declaration failed to parse: permanently blocked
    Invalid(ParseError),
}

impl BlockerCheck {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, BlockerCheck::Satisfied)
    }
}

/// Evaluates one condition against one target
pub fn condition_holds(store: &TaskStore, target: &TaskId, condition: &Condition) -> bool {
    match condition {
        Condition::InState(states) => store
            .derived_state(target)
            .is_some_and(|s| states.contains(&s)),
        Condition::HasProperty { name, value } => store.get(target).is_some_and(|t| match value {
            None => t.properties.contains_key(name),
            Some(expected) => t.property(name) == Some(expected.as_str()),
        }),
        Condition::Closed => store
            .derived_state(target)
            .is_some_and(TaskState::is_closed),
        Condition::Not(inner) => !condition_holds(store, target, inner),
    }
}

/// Evaluates every clause of a parsed blocker for `source`
pub fn unsatisfied_clauses(store: &TaskStore, source: &TaskId, blocker: &Blocker) -> Vec<Unsatisfied> {
    blocker
        .clauses
        .iter()
        .filter_map(|clause| {
            let targets = resolve_finder(store, source, &clause.finder);
            let failing: Vec<TaskId> = targets
                .found
                .into_iter()
                .filter(|t| !condition_holds(store, t, &clause.op))
                .collect();

            if failing.is_empty() && targets.missing.is_empty() {
                None
            } else {
                Some(Unsatisfied {
                    clause: clause.text.clone(),
                    targets: failing,
                    missing: targets.missing,
                })
            }
        })
        .collect()
}

/// Evaluates the blocker of `id`; an absent blocker is vacuously satisfied
pub fn check_blocker(store: &TaskStore, declarations: Option<&Declarations>, id: &TaskId) -> BlockerCheck {
    match declarations.and_then(|d| d.blocker.as_ref()) {
        None => BlockerCheck::Satisfied,
        Some(Err(err)) => BlockerCheck::Invalid(err.clone()),
        Some(Ok(blocker)) => {
            let unsatisfied = unsatisfied_clauses(store, id, blocker);
            if unsatisfied.is_empty() {
                BlockerCheck::Satisfied
            } else {
                BlockerCheck::Blocked(unsatisfied)
            }
        }
    }
}

/// Leaf task in an open state
pub fn is_structurally_actionable(store: &TaskStore, task: &Task) -> bool {
    store.is_leaf(&task.id) && task.state.is_some_and(TaskState::is_open) && !task.container
}

/// True once a task has children and every one of them reads as closed
pub fn children_closed(store: &TaskStore, id: &TaskId) -> bool {
    let children = store.child_ids(id);
    !children.is_empty()
        && children
            .iter()
            .all(|c| store.derived_state(c).is_some_and(TaskState::is_closed))
}

/// Derived status of a task, or `None` if the ID is unknown
pub fn effective_status(
    store: &TaskStore,
    declarations: Option<&Declarations>,
    id: &TaskId,
) -> Option<EffectiveStatus> {
    let task = store.get(id)?;

    if task.is_container() {
        return Some(EffectiveStatus::Container);
    }

    if !is_structurally_actionable(store, task) {
        return task.state.map(EffectiveStatus::State);
    }

    Some(if check_blocker(store, declarations, id).is_satisfied() {
        EffectiveStatus::Ready
    } else {
        EffectiveStatus::Waiting
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::TaskRecord;
    use std::collections::HashMap;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    struct Fixture {
        store: TaskStore,
        decls: HashMap<TaskId, Declarations>,
    }

    impl Fixture {
        fn new(records: Vec<TaskRecord>) -> Self {
            let store = TaskStore::from_records(records).unwrap();
            let decls = store
                .all()
                .map(|t| (t.id.clone(), Declarations::compile(t)))
                .collect();
            Self { store, decls }
        }

        fn status(&self, s: &str) -> EffectiveStatus {
            effective_status(&self.store, self.decls.get(&id(s)), &id(s)).unwrap()
        }

        fn finish(&mut self, s: &str) {
            self.store.set_state(&id(s), TaskState::InProgress).unwrap();
            self.store.set_state(&id(s), TaskState::Done).unwrap();
        }
    }

    #[test]
    fn no_blocker_is_ready() {
        let fx = Fixture::new(vec![TaskRecord::new(id("A"), "a")]);
        assert_eq!(fx.status("A"), EffectiveStatus::Ready);
    }

    #[test]
    fn all_targets_must_satisfy() {
        let mut fx = Fixture::new(vec![
            TaskRecord::new(id("A"), "a"),
            TaskRecord::new(id("B"), "b"),
            TaskRecord::new(id("X"), "x").with_blocker("ids(A B) todo?(DONE)"),
        ]);

        assert_eq!(fx.status("X"), EffectiveStatus::Waiting);

        fx.finish("A");
        assert_eq!(fx.status("X"), EffectiveStatus::Waiting);

        let check = check_blocker(&fx.store, fx.decls.get(&id("X")), &id("X"));
        match check {
            BlockerCheck::Blocked(unsatisfied) => {
                assert_eq!(unsatisfied.len(), 1);
                assert_eq!(unsatisfied[0].targets, vec![id("B")]);
            }
            other => panic!("expected blocked, got {:?}", other),
        }

        fx.finish("B");
        assert_eq!(fx.status("X"), EffectiveStatus::Ready);
    }

    #[test]
    fn invalid_blocker_is_permanently_waiting() {
        let fx = Fixture::new(vec![TaskRecord::new(id("Y"), "y").with_blocker("blokcer(typo")]);

        assert_eq!(fx.status("Y"), EffectiveStatus::Waiting);
        assert!(matches!(
            check_blocker(&fx.store, fx.decls.get(&id("Y")), &id("Y")),
            BlockerCheck::Invalid(_)
        ));
    }

    #[test]
    fn unknown_target_blocks() {
        let fx = Fixture::new(vec![TaskRecord::new(id("X"), "x").with_blocker("ids(GHOST) todo?(DONE)")]);

        assert_eq!(fx.status("X"), EffectiveStatus::Waiting);
        let BlockerCheck::Blocked(unsatisfied) = check_blocker(&fx.store, fx.decls.get(&id("X")), &id("X"))
        else {
            panic!("expected blocked");
        };
        assert_eq!(unsatisfied[0].missing, vec![id("GHOST")]);
    }

    #[test]
    fn non_leaf_and_closed_tasks_mirror_state() {
        let mut fx = Fixture::new(vec![
            TaskRecord::new(id("P"), "p").with_blocker("children todo?(DONE)"),
            TaskRecord::new(id("C1"), "c1").with_parent(id("P")),
            TaskRecord::container(id("G"), "goal"),
        ]);

        assert_eq!(fx.status("P"), EffectiveStatus::State(TaskState::Todo));
        assert_eq!(fx.status("G"), EffectiveStatus::Container);

        fx.finish("C1");
        assert_eq!(fx.status("C1"), EffectiveStatus::State(TaskState::Done));
        assert!(children_closed(&fx.store, &id("P")));
    }

    #[test]
    fn in_progress_is_not_actionable() {
        let mut fx = Fixture::new(vec![TaskRecord::new(id("A"), "a")]);
        fx.store.set_state(&id("A"), TaskState::InProgress).unwrap();

        assert_eq!(fx.status("A"), EffectiveStatus::State(TaskState::InProgress));
    }

    #[test]
    fn negated_and_property_conditions() {
        let fx = Fixture::new(vec![
            TaskRecord::new(id("A"), "a").with_property("REVIEWED", "yes"),
            TaskRecord::new(id("X"), "x").with_blocker("ids(A) !todo?(TODO)"),
            TaskRecord::new(id("Y"), "y").with_blocker("ids(A) has-property?(REVIEWED yes)"),
            TaskRecord::new(id("Z"), "z").with_blocker("ids(A) has-property?(REVIEWED no)"),
        ]);

        assert_eq!(fx.status("X"), EffectiveStatus::Waiting);
        assert_eq!(fx.status("Y"), EffectiveStatus::Ready);
        assert_eq!(fx.status("Z"), EffectiveStatus::Waiting);
    }

    #[test]
    fn empty_finder_is_vacuous() {
        let fx = Fixture::new(vec![TaskRecord::new(id("A"), "a").with_blocker("children todo?(DONE)")]);
        assert_eq!(fx.status("A"), EffectiveStatus::Ready);
    }

    #[test]
    fn status_labels() {
        assert_eq!(EffectiveStatus::Ready.to_string(), "READY");
        assert_eq!(EffectiveStatus::State(TaskState::Cancelled).to_string(), "CANCELLED");
        assert_eq!(
            serde_json::to_string(&EffectiveStatus::Container).unwrap(),
            "\"PROJECT\""
        );
    }
}
