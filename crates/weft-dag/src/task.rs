//! Task contract: units of work with typed input and output bindings.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::datum::{DatumRef, DatumState, Pointer};
use crate::error::TaskError;
use crate::hash::short_hash;
use crate::resources::ResourceDemand;

/// Concrete arguments handed to a task body.
pub type TaskArgs = BTreeMap<String, Pointer>;

/// Raw results returned by a task body: output name to pointer.
pub type RawOutputs = BTreeMap<String, Pointer>;

/// Execution state of a task, driven exclusively by the workflow manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for parents to complete and inputs to become available.
    Waiting,
    /// Body dispatched to a worker.
    Running,
    /// Body finished and every declared output verified available.
    Complete,
    /// Body, worker, or finalization failed; cleanup has run.
    Failed,
}

impl TaskState {
    /// Whether the state is terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Failed)
    }
}

/// Lazy reference to a named output of another task.
///
/// Holds a weak back-reference to the producer; the manager resolves it
/// to the concrete datum once the producer's outputs are initialized.
#[derive(Clone)]
pub struct OutputRef {
    producer: Weak<dyn Task>,
    output: String,
}

impl OutputRef {
    pub fn new(producer: &Arc<dyn Task>, output: impl Into<String>) -> Self {
        Self {
            producer: Arc::downgrade(producer),
            output: output.into(),
        }
    }

    /// The producing task, if still alive.
    pub fn producer(&self) -> Option<Arc<dyn Task>> {
        self.producer.upgrade()
    }

    /// Name of the referenced output.
    pub fn output(&self) -> &str {
        &self.output
    }
}

/// Where an input binding draws its value from.
#[derive(Clone)]
pub enum BindingSource {
    /// An externally supplied datum.
    External(DatumRef),
    /// A named output of an upstream task.
    Output(OutputRef),
}

/// A named input binding on a task. Bindings to upstream outputs are the
/// edges of the workflow DAG.
#[derive(Clone)]
pub struct InputBinding {
    pub name: String,
    pub source: BindingSource,
}

impl InputBinding {
    pub fn external(name: impl Into<String>, datum: DatumRef) -> Self {
        Self {
            name: name.into(),
            source: BindingSource::External(datum),
        }
    }

    pub fn output(
        name: impl Into<String>,
        producer: &Arc<dyn Task>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: BindingSource::Output(OutputRef::new(producer, output)),
        }
    }
}

/// A unit of computational work in the workflow DAG.
///
/// Implementations supply output construction and the body; the manager
/// owns state transitions, readiness checks, and output finalization.
/// Bodies must be executable on a worker distinct from the control
/// context, hence `Send + Sync` and the pointer-level argument form.
pub trait Task: Send + Sync {
    /// Caller-supplied identifier, unique within a workflow.
    fn name(&self) -> &str;

    /// Input bindings, in declaration order.
    fn inputs(&self) -> Vec<InputBinding>;

    /// Declared resource demand; absent keys mean zero.
    fn resources(&self) -> ResourceDemand {
        ResourceDemand::none()
    }

    /// Build concrete datums for the declared outputs, in declaration
    /// order. Called once per task before scheduling begins.
    fn initialize_outputs(&self) -> anyhow::Result<Vec<(String, DatumRef)>>;

    /// Resolve bound datums to the argument form the body consumes.
    ///
    /// Runs on the worker immediately before [`Task::run_logic`]. Every
    /// bound datum is available by the time a correct scheduler gets
    /// here; the default implementation takes each datum's pointer.
    fn collect_inputs(&self, inputs: &BTreeMap<String, DatumRef>) -> anyhow::Result<TaskArgs> {
        let mut args = TaskArgs::new();
        for (name, datum) in inputs {
            if datum.state() != DatumState::Available {
                return Err(TaskError::InputNotReady(name.clone()).into());
            }
            let pointer = datum
                .pointer()
                .ok_or_else(|| TaskError::InputNotReady(name.clone()))?;
            args.insert(name.clone(), pointer);
        }
        Ok(args)
    }

    /// Perform the computation, returning a pointer per declared output.
    fn run_logic(&self, args: TaskArgs) -> anyhow::Result<RawOutputs>;

    /// Short identity for change detection.
    fn quickhash(&self) -> String {
        short_hash(self.name().as_bytes())
    }

    /// Called when the workflow is cancelled while this task runs.
    ///
    /// Must be idempotent and safe to invoke from the control context.
    fn interrupt_cleanup(&self) {}

    /// Called when the task fails or its worker crashes.
    fn fail_cleanup(&self) {}
}
