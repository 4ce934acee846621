//! Worker-pool contract consumed by the workflow manager.
//!
//! Task bodies run in isolated workers; the control loop never blocks on
//! one, it polls. Any executor satisfying this contract is admissible:
//! thread pools, process pools, or remote runners. The core never creates
//! a pool itself.

use thiserror::Error;

use crate::task::RawOutputs;

/// A packaged task body: collect inputs, run the logic, return raw
/// outputs.
pub type Job = Box<dyn FnOnce() -> anyhow::Result<RawOutputs> + Send + 'static>;

/// How a worker finished unsuccessfully.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The job itself returned an error.
    #[error(transparent)]
    Job(#[from] anyhow::Error),

    /// The worker crashed: panic, killed thread, lost process.
    #[error("{0}")]
    Crashed(String),

    /// The worker observed an interrupt and stopped early.
    #[error("worker interrupted")]
    Interrupted,
}

/// Poll result for an in-flight worker.
pub enum WorkerPoll {
    /// Still executing.
    Pending,
    /// Finished. Yielded exactly once; later polls return `Pending`.
    Done(Result<RawOutputs, WorkerError>),
}

/// An in-flight worker executing one job.
pub trait WorkerHandle: Send {
    /// Non-blocking completion check.
    fn poll(&mut self) -> WorkerPoll;

    /// Ask the worker to stop. Cooperative and idempotent; a worker that
    /// never checks runs to completion.
    fn interrupt(&self);
}

/// Executor for task bodies.
pub trait WorkerPool: Send + Sync {
    /// Dispatch a job, returning its in-flight handle.
    fn submit(&self, job: Job) -> Box<dyn WorkerHandle>;

    /// Stop accepting work and release pool resources.
    fn shutdown(&self);
}
