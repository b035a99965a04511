//! Task graph domain
//!
//! Pure logic with no I/O: declarations, the task store, the blocking graph,
//! readiness, propagation and reporting.

mod engine;
mod expr;
mod graph;
mod id;
mod readiness;
mod report;
mod shared;
mod store;
mod task;

pub use engine::{
    AppliedChange, CascadeWarning, DeclarationKind, Engine, EngineError, Resolution,
    TransitionReport,
};
pub use expr::{
    parse_blocker, parse_trigger, Action, Blocker, Clause, Condition, Declarations, Finder,
    ParseError, Trigger,
};
pub use graph::{resolve_finder, BlockingEdge, BlockingGraph, GraphResolver, Targets};
pub use id::{IdError, TaskId};
pub use readiness::{BlockerCheck, EffectiveStatus, Unsatisfied};
pub use report::{Analysis, Bottleneck, DependencyGraph, EdgeKind, GraphEdge, GraphNode, Summary};
pub use shared::SharedEngine;
pub use store::{StoreError, TaskStore};
pub use task::{Priority, Task, TaskRecord, TaskState, UnknownState};
