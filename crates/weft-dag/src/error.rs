//! Error taxonomy for workflow construction and execution.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Workflow-level errors, raised before or outside task execution.
#[derive(Debug, Error)]
pub enum Error {
    /// The task graph contains a dependency cycle.
    #[error("cycle detected in workflow dependencies: {}", path.join(" -> "))]
    CyclicGraph { path: Vec<String> },

    /// A task demands more of a resource than the budget will ever hold.
    #[error("task `{task}` demands {demand} of `{resource}` but the budget caps it at {budget}")]
    UnsatisfiableResource {
        task: String,
        resource: String,
        demand: u64,
        budget: u64,
    },

    /// Two tasks in the same workflow share a name.
    #[error("duplicate task name `{0}` in workflow")]
    DuplicateTask(String),

    /// An input binding references an output of a task that was dropped.
    #[error("task `{task}` binds input `{input}` to an output of a dropped task")]
    DanglingBinding { task: String, input: String },

    /// An input binding references an output the producer never declared.
    #[error("task `{task}` binds input `{input}` to unknown output `{output}` of task `{producer}`")]
    UnknownOutput {
        task: String,
        input: String,
        producer: String,
        output: String,
    },

    /// A task failed to construct its output datums.
    #[error("task `{task}` failed to initialize outputs: {source}")]
    OutputInit {
        task: String,
        #[source]
        source: anyhow::Error,
    },

    /// The manager already ran to a terminal state.
    #[error("workflow has already run")]
    AlreadyRun,
}

/// Failure of a single task, retained on the run report.
#[derive(Debug, Error)]
pub enum TaskError {
    /// An input datum was not available when the body collected it.
    /// Admission checks make this unreachable; seeing it means a
    /// scheduler bug.
    #[error("input `{0}` is not available")]
    InputNotReady(String),

    /// A declared output was absent from the body's result map.
    #[error("declared output `{0}` missing from task results")]
    OutputMissing(String),

    /// Populating or verifying an output datum failed.
    #[error(transparent)]
    Datum(#[from] DatumError),

    /// The task body returned an error.
    #[error("task body failed: {0}")]
    Body(String),

    /// The worker executing the body crashed or panicked.
    #[error("worker crashed: {0}")]
    WorkerCrash(String),

    /// The workflow was cancelled while the task was running.
    #[error("interrupted by cancellation")]
    Interrupted,
}

/// Datum state-machine violations.
#[derive(Debug, Error)]
pub enum DatumError {
    /// The pointer failed format validation, or an already-populated
    /// datum was repopulated with a different pointer.
    #[error("invalid pointer format: {0}")]
    InvalidFormat(String),

    /// Verification could not observe the referenced value.
    #[error("datum not available: {0}")]
    NotAvailable(String),
}
