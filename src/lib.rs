//! Task Graph - dependency-aware task tracking
//!
//! Tasks declare what blocks them (`BLOCKER`) and what happens when they
//! change state (`TRIGGER`). The engine answers which tasks are actionable
//! right now and propagates state changes through the graph.

pub mod cli;
pub mod domain;
pub mod external;
pub mod logging;
pub mod storage;

pub use domain::{Engine, EngineError, Task, TaskId, TaskRecord, TaskState, TransitionReport};
