//! Engine facade and propagation
//!
//! `Engine` owns the task store, the compiled declarations and the cached
//! blocking graph. `apply_transition` is the only way to change a task's state
//! from outside: it validates the request, commits it, then fires the task's
//! trigger and cascades through any further triggers.
//!
//! A trigger fires when its task reaches DONE or CANCELLED. Cascades run off
//! an explicit stack of pending steps, so chain length never touches the call
//! stack.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::expr::{Action, Clause, Declarations, ParseError};
use super::graph::{resolve_finder, BlockingEdge, BlockingGraph, GraphResolver};
use super::id::TaskId;
use super::readiness::{self, BlockerCheck, EffectiveStatus, Unsatisfied};
use super::store::{StoreError, TaskStore};
use super::task::{Task, TaskRecord, TaskState};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("Unknown task id: {0}")]
    UnknownTaskId(TaskId),

    #[error("Task {task}: transition {from} -> {to} is not allowed")]
    InvalidTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task {0} is a project; its state follows its children and cannot be set")]
    NotSettable(TaskId),

    #[error("Task {task} is still blocked by: {clause}")]
    StillBlocked { task: TaskId, clause: String },

    #[error("Blocking cycle detected: {}", join_path(.path))]
    CycleDetected { path: Vec<TaskId> },

    #[error("Task {task} has an invalid {kind}: {error}")]
    Parse {
        task: TaskId,
        kind: DeclarationKind,
        error: ParseError,
    },

    #[error("Invalid task corpus: {0}")]
    Corpus(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownTaskId(id) => EngineError::UnknownTaskId(id),
            StoreError::InvalidState { task, from, to } => {
                EngineError::InvalidTransition { task, from, to }
            }
            StoreError::NoState(id) => EngineError::NotSettable(id),
            other => EngineError::Corpus(other),
        }
    }
}

fn join_path(path: &[TaskId]) -> String {
    path.iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Blocker,
    Trigger,
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclarationKind::Blocker => f.write_str("BLOCKER"),
            DeclarationKind::Trigger => f.write_str("TRIGGER"),
        }
    }
}

/// One change made by a cascade
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedChange {
    State {
        task: TaskId,
        from: TaskState,
        to: TaskState,
        /// Task whose trigger caused the change
        origin: TaskId,
    },
    Property {
        task: TaskId,
        name: String,
        value: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        previous: Option<String>,
        origin: TaskId,
    },
}

/// Non-fatal problem found while cascading
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CascadeWarning {
    #[error("Propagation loop: trigger on {origin} would set {target} to {state} again")]
    PropagationLoopDetected {
        origin: TaskId,
        target: TaskId,
        state: TaskState,
    },

    #[error("Trigger on {origin} could not update {target}: {reason}")]
    Failed {
        origin: TaskId,
        target: TaskId,
        reason: String,
    },

    #[error("Trigger on {origin} references unknown task {target}")]
    UnknownTarget { origin: TaskId, target: TaskId },

    #[error("Trigger on {origin} is invalid and was skipped: {message}")]
    InvalidTrigger { origin: TaskId, message: String },
}

/// Outcome of a successful `apply_transition`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    pub task: TaskId,
    pub from: TaskState,
    pub to: TaskState,
    pub applied: Vec<AppliedChange>,
    pub warnings: Vec<CascadeWarning>,
    /// Tasks whose effective status became READY
    pub newly_ready: Vec<TaskId>,
    /// Open parents whose children are now all closed
    pub eligible_parents: Vec<TaskId>,
}

/// Resolved blocker of one task
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub task: TaskId,
    pub status: EffectiveStatus,
    pub edges: Vec<BlockingEdge>,
    pub unsatisfied: Vec<Unsatisfied>,
}

/// Pending work of one propagation call
enum Step {
    /// Run the trigger of a task that just closed
    Fire(TaskId),
    /// Resolve one trigger clause of `origin`
    Clause { origin: TaskId, clause: Clause<Action> },
    /// Apply an action to one resolved target
    Apply {
        origin: TaskId,
        target: TaskId,
        action: Action,
    },
}

/// Mutable state threaded through one propagation call
#[derive(Default)]
struct Cascade {
    visited: HashSet<(TaskId, TaskState)>,
    applied: Vec<AppliedChange>,
    warnings: Vec<CascadeWarning>,
    /// Steps still to run; the last one runs next
    pending: Vec<Step>,
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    store: TaskStore,
    declarations: HashMap<TaskId, Declarations>,
    resolver: GraphResolver,
}

impl Engine {
    /// Loads a corpus and compiles every declaration once
    pub fn new(records: impl IntoIterator<Item = TaskRecord>) -> Result<Self, EngineError> {
        let store = TaskStore::from_records(records)?;
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: TaskStore) -> Self {
        let declarations: HashMap<TaskId, Declarations> = store
            .all()
            .map(|task| (task.id.clone(), Declarations::compile(task)))
            .collect();

        for (id, decls) in &declarations {
            if let Some(err) = decls.blocker_error() {
                warn!(task = %id, error = %err, "invalid BLOCKER, task stays blocked");
            }
            if let Some(err) = decls.trigger_error() {
                warn!(task = %id, error = %err, "invalid TRIGGER, treated as no-op");
            }
        }

        Self {
            store,
            declarations,
            resolver: GraphResolver::new(),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.store.get(id)
    }

    pub fn require(&self, id: &TaskId) -> Result<&Task, EngineError> {
        Ok(self.store.require(id)?)
    }

    pub fn declarations(&self, id: &TaskId) -> Option<&Declarations> {
        self.declarations.get(id)
    }

    /// Every declaration that failed to parse, in declaration order
    pub fn invalid_declarations(&self) -> Vec<EngineError> {
        let mut out = Vec::new();
        for task in self.store.all() {
            let Some(decls) = self.declarations.get(&task.id) else {
                continue;
            };
            if let Some(err) = decls.blocker_error() {
                out.push(EngineError::Parse {
                    task: task.id.clone(),
                    kind: DeclarationKind::Blocker,
                    error: err.clone(),
                });
            }
            if let Some(err) = decls.trigger_error() {
                out.push(EngineError::Parse {
                    task: task.id.clone(),
                    kind: DeclarationKind::Trigger,
                    error: err.clone(),
                });
            }
        }
        out
    }

    pub fn blocking_graph(&self) -> &BlockingGraph {
        self.resolver.graph(&self.store, &self.declarations)
    }

    pub fn cycles(&self) -> &[Vec<TaskId>] {
        self.resolver.cycles(&self.store, &self.declarations)
    }

    /// Fails with `CycleDetected` if `id` lies on or can reach a blocking cycle
    pub fn check_cycles(&self, id: &TaskId) -> Result<(), EngineError> {
        match self.resolver.cycle_involving(&self.store, &self.declarations, id) {
            Some(path) => Err(EngineError::CycleDetected { path: path.clone() }),
            None => Ok(()),
        }
    }

    pub fn effective_status(&self, id: &TaskId) -> Option<EffectiveStatus> {
        readiness::effective_status(&self.store, self.declarations.get(id), id)
    }

    pub fn blocker_check(&self, id: &TaskId) -> Result<BlockerCheck, EngineError> {
        self.require(id)?;
        Ok(readiness::check_blocker(&self.store, self.declarations.get(id), id))
    }

    /// Materializes the blocking edges and unsatisfied clauses of a task
    pub fn resolve(&self, id: &TaskId) -> Result<Resolution, EngineError> {
        self.require(id)?;
        self.check_cycles(id)?;

        let unsatisfied = match self.blocker_check(id)? {
            BlockerCheck::Satisfied => Vec::new(),
            BlockerCheck::Blocked(unsatisfied) => unsatisfied,
            BlockerCheck::Invalid(error) => {
                return Err(EngineError::Parse {
                    task: id.clone(),
                    kind: DeclarationKind::Blocker,
                    error,
                })
            }
        };

        Ok(Resolution {
            task: id.clone(),
            status: self
                .effective_status(id)
                .ok_or_else(|| EngineError::UnknownTaskId(id.clone()))?,
            edges: self.blocking_graph().edges_from(id),
            unsatisfied,
        })
    }

    /// Applies a state change and propagates triggers
    ///
    /// The primary transition is validated before anything is mutated. Once it
    /// commits, cascade failures are collected as warnings and never roll it
    /// back.
    pub fn apply_transition(
        &mut self,
        id: &TaskId,
        new_state: TaskState,
    ) -> Result<TransitionReport, EngineError> {
        let from = self.validate(id, new_state)?;

        let ready_before = self.ready_set();
        let eligible_before = self.eligible_parent_set();

        self.commit(id, new_state)?;
        debug!(task = %id, %from, to = %new_state, "transition applied");

        let mut cascade = Cascade::default();
        cascade.visited.insert((id.clone(), new_state));
        if new_state.is_closed() {
            cascade.pending.push(Step::Fire(id.clone()));
        }
        self.run_cascade(&mut cascade);

        for warning in &cascade.warnings {
            warn!("{}", warning);
        }

        let newly_ready = self
            .ready_set()
            .difference(&ready_before)
            .cloned()
            .collect();
        let eligible_parents = self
            .eligible_parent_set()
            .difference(&eligible_before)
            .cloned()
            .collect();

        Ok(TransitionReport {
            task: id.clone(),
            from,
            to: new_state,
            applied: cascade.applied,
            warnings: cascade.warnings,
            newly_ready,
            eligible_parents,
        })
    }

    /// Checks legality and, for DONE, the blocker and completion policy.
    /// Returns the current state.
    fn validate(&self, id: &TaskId, to: TaskState) -> Result<TaskState, EngineError> {
        let task = self.require(id)?;
        let from = match task.state {
            Some(state) if !task.container => state,
            _ => return Err(EngineError::NotSettable(id.clone())),
        };

        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                task: id.clone(),
                from,
                to,
            });
        }

        if to == TaskState::Done {
            self.check_completion(id)?;
        }

        Ok(from)
    }

    fn check_completion(&self, id: &TaskId) -> Result<(), EngineError> {
        let still_blocked = |clause: String| EngineError::StillBlocked {
            task: id.clone(),
            clause,
        };

        match readiness::check_blocker(&self.store, self.declarations.get(id), id) {
            BlockerCheck::Satisfied => {}
            BlockerCheck::Blocked(unsatisfied) => {
                let clause = unsatisfied
                    .into_iter()
                    .next()
                    .map(|u| u.clause)
                    .unwrap_or_default();
                return Err(still_blocked(clause));
            }
            BlockerCheck::Invalid(err) => {
                return Err(still_blocked(format!("invalid BLOCKER ({})", err)));
            }
        }

        let has_blocking_clauses = matches!(
            self.declarations.get(id).and_then(|d| d.blocker.as_ref()),
            Some(Ok(blocker)) if !blocker.clauses.is_empty()
        );
        if has_blocking_clauses {
            if let Some(cycle) = self.blocking_graph().cycle_through(id) {
                return Err(still_blocked(format!("blocking cycle {}", join_path(&cycle))));
            }
        }

        let open: Vec<&str> = self
            .store
            .child_ids(id)
            .iter()
            .filter(|c| !self.store.derived_state(c).is_some_and(TaskState::is_closed))
            .map(TaskId::as_str)
            .collect();
        if !open.is_empty() {
            return Err(still_blocked(format!("open children ({})", open.join(" "))));
        }

        Ok(())
    }

    fn commit(&mut self, id: &TaskId, state: TaskState) -> Result<(), EngineError> {
        self.store.set_state(id, state)?;
        self.resolver.invalidate();
        Ok(())
    }

    /// Drains the pending steps depth first: a target's own trigger runs
    /// before the next target of the clause that reached it
    fn run_cascade(&mut self, cascade: &mut Cascade) {
        while let Some(step) = cascade.pending.pop() {
            match step {
                Step::Fire(origin) => self.fire_trigger(origin, cascade),
                Step::Clause { origin, clause } => {
                    let targets = resolve_finder(&self.store, &origin, &clause.finder);

                    for missing in targets.missing {
                        cascade.warnings.push(CascadeWarning::UnknownTarget {
                            origin: origin.clone(),
                            target: missing,
                        });
                    }

                    for target in targets.found.into_iter().rev() {
                        cascade.pending.push(Step::Apply {
                            origin: origin.clone(),
                            target,
                            action: clause.op.clone(),
                        });
                    }
                }
                Step::Apply {
                    origin,
                    target,
                    action,
                } => match action {
                    Action::SetState(state) => self.cascade_state(&origin, target, state, cascade),
                    Action::SetProperty { name, value } => {
                        self.cascade_property(&origin, target, &name, &value, cascade)
                    }
                },
            }
        }
    }

    fn fire_trigger(&mut self, origin: TaskId, cascade: &mut Cascade) {
        let trigger = match self.declarations.get(&origin).and_then(|d| d.trigger.as_ref()) {
            None => return,
            Some(Err(err)) => {
                cascade.warnings.push(CascadeWarning::InvalidTrigger {
                    message: err.to_string(),
                    origin,
                });
                return;
            }
            Some(Ok(trigger)) => trigger,
        };

        for clause in trigger.clauses.iter().rev() {
            cascade.pending.push(Step::Clause {
                origin: origin.clone(),
                clause: clause.clone(),
            });
        }
    }

    fn cascade_state(
        &mut self,
        origin: &TaskId,
        target: TaskId,
        state: TaskState,
        cascade: &mut Cascade,
    ) {
        if !cascade.visited.insert((target.clone(), state)) {
            cascade.warnings.push(CascadeWarning::PropagationLoopDetected {
                origin: origin.clone(),
                target,
                state,
            });
            return;
        }

        if self.store.get(&target).and_then(|t| t.state) == Some(state) {
            return;
        }

        let from = match self.validate(&target, state) {
            Ok(from) => from,
            Err(err) => {
                cascade.warnings.push(CascadeWarning::Failed {
                    origin: origin.clone(),
                    target,
                    reason: err.to_string(),
                });
                return;
            }
        };

        if let Err(err) = self.commit(&target, state) {
            cascade.warnings.push(CascadeWarning::Failed {
                origin: origin.clone(),
                target,
                reason: err.to_string(),
            });
            return;
        }

        debug!(task = %target, %from, to = %state, origin = %origin, "cascade transition");
        cascade.applied.push(AppliedChange::State {
            task: target.clone(),
            from,
            to: state,
            origin: origin.clone(),
        });

        if state.is_closed() {
            cascade.pending.push(Step::Fire(target));
        }
    }

    fn cascade_property(
        &mut self,
        origin: &TaskId,
        target: TaskId,
        name: &str,
        value: &str,
        cascade: &mut Cascade,
    ) {
        match self.store.set_property(&target, name, value) {
            Ok(previous) => {
                self.resolver.invalidate();
                debug!(task = %target, property = name, value, origin = %origin, "cascade property");
                cascade.applied.push(AppliedChange::Property {
                    task: target,
                    name: name.to_string(),
                    value: value.to_string(),
                    previous,
                    origin: origin.clone(),
                });
            }
            Err(err) => cascade.warnings.push(CascadeWarning::Failed {
                origin: origin.clone(),
                target,
                reason: err.to_string(),
            }),
        }
    }

    fn ready_set(&self) -> BTreeSet<TaskId> {
        self.store
            .all()
            .filter(|t| self.effective_status(&t.id) == Some(EffectiveStatus::Ready))
            .map(|t| t.id.clone())
            .collect()
    }

    fn eligible_parent_set(&self) -> BTreeSet<TaskId> {
        self.store
            .all()
            .filter(|t| !t.is_container())
            .filter(|t| !t.state.is_some_and(TaskState::is_closed))
            .filter(|t| readiness::children_closed(&self.store, &t.id))
            .map(|t| t.id.clone())
            .collect()
    }
}
