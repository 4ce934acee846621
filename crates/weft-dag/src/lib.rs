//! DAG workflow engine core.
//!
//! Core concepts:
//! - **Datum**: a three-state handle (empty / populated / available) to a
//!   value produced or consumed by tasks
//! - **Task**: a unit of work with named input bindings, declared
//!   outputs, and a resource demand
//! - **WorkflowManager**: walks the graph from a root task, admits ready
//!   tasks under a global resource budget, and dispatches their bodies to
//!   an injected worker pool
//!
//! Edges are implicit: binding a task's input to another task's output
//! makes the producer a parent. The manager discovers the root's
//! ancestors, rejects cycles and unsatisfiable demands up front, and
//! drives every task through `waiting -> running -> complete | failed`.
//!
//! Concrete datum and task variants live in companion crates; the core is
//! polymorphic over the [`DatumBackend`], [`Task`], and [`WorkerPool`]
//! traits and never inspects concrete types.

mod datum;
mod error;
mod graph;
mod group;
mod hash;
mod manager;
mod pool;
mod resources;
mod task;

pub use datum::{Datum, DatumBackend, DatumRef, DatumState, Pointer};
pub use error::{DatumError, Error, Result, TaskError};
pub use graph::{ancestors, detect_cycle, parents, topo_order};
pub use group::DatumGroup;
pub use hash::short_hash;
pub use manager::{CancelHandle, Outcome, RunReport, TaskFailure, WorkflowManager};
pub use pool::{Job, WorkerError, WorkerHandle, WorkerPoll, WorkerPool};
pub use resources::{ResourceBudget, ResourceDemand};
pub use task::{
    BindingSource, InputBinding, OutputRef, RawOutputs, Task, TaskArgs, TaskState,
};
