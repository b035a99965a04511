//! Engine shared between threads
//!
//! One writer at a time: a transition holds the write lock for its whole
//! cascade. Readers either query under the read lock or take a snapshot.

use std::sync::Arc;

use parking_lot::RwLock;

use super::engine::{Engine, EngineError, TransitionReport};
use super::id::TaskId;
use super::report::Summary;
use super::task::{Task, TaskState};

#[derive(Debug, Clone, Default)]
pub struct SharedEngine {
    inner: Arc<RwLock<Engine>>,
}

impl SharedEngine {
    pub fn new(engine: Engine) -> Self {
        Self {
            inner: Arc::new(RwLock::new(engine)),
        }
    }

    pub fn apply_transition(
        &self,
        id: &TaskId,
        state: TaskState,
    ) -> Result<TransitionReport, EngineError> {
        self.inner.write().apply_transition(id, state)
    }

    /// Point-in-time copy of the whole engine
    pub fn snapshot(&self) -> Engine {
        self.inner.read().clone()
    }

    pub fn actionable_tasks(&self) -> Vec<Task> {
        self.inner
            .read()
            .actionable_tasks()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> Summary {
        self.inner.read().summary()
    }

    /// Runs a read-only closure under the read lock
    pub fn read<R>(&self, f: impl FnOnce(&Engine) -> R) -> R {
        f(&self.inner.read())
    }
}
