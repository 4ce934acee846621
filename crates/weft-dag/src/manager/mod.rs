//! Workflow manager: the concurrent scheduling loop.
//!
//! Construction discovers the root's ancestors, validates the graph and
//! the resource budget, and initializes every task's outputs. The run
//! loop then alternates reaping finished workers, forwarding
//! cancellation, and admitting ready tasks under the budget, sleeping
//! briefly when nothing moves. Task bodies execute on an injected worker
//! pool; the control loop never runs one itself.

mod report;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::datum::{DatumRef, DatumState};
use crate::error::{Error, Result, TaskError};
use crate::graph;
use crate::pool::{Job, WorkerError, WorkerHandle, WorkerPoll, WorkerPool};
use crate::resources::{ResourceBudget, ResourceDemand, ResourcePool};
use crate::task::{BindingSource, RawOutputs, Task, TaskState};

pub use report::{Outcome, RunReport, TaskFailure};

/// Idle sleep bounds for the scheduling loop. The sleep doubles while
/// nothing moves and resets on progress.
const BACKOFF_MIN: Duration = Duration::from_millis(1);
const BACKOFF_MAX: Duration = Duration::from_millis(50);

/// Cloneable cancellation entry point, usable from any context while
/// `run` holds the manager.
#[derive(Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    /// Request cancellation; idempotent.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

struct TaskEntry {
    task: Arc<dyn Task>,
    state: TaskState,
    demand: ResourceDemand,
    /// Parent entry indices, derived from output bindings.
    parents: Vec<usize>,
    /// Resolved input datums, in binding order.
    inputs: Vec<(String, DatumRef)>,
    /// Initialized output datums, in declaration order.
    outputs: Vec<(String, DatumRef)>,
    handle: Option<Box<dyn WorkerHandle>>,
    interrupted: bool,
    error: Option<TaskError>,
}

/// Executes the ancestors of a root task, respecting dependency order and
/// a global resource budget.
pub struct WorkflowManager {
    run_id: Uuid,
    /// Discovery order; admission ties break on index.
    entries: Vec<TaskEntry>,
    index: BTreeMap<String, usize>,
    pool: Arc<dyn WorkerPool>,
    resources: ResourcePool,
    cancel: CancellationToken,
    failed_latch: bool,
    finished: bool,
}

impl std::fmt::Debug for WorkflowManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowManager")
            .field("run_id", &self.run_id)
            .field("entries", &self.entries.len())
            .field("failed_latch", &self.failed_latch)
            .field("finished", &self.finished)
            .finish()
    }
}

impl WorkflowManager {
    /// Build a manager with an unbounded resource budget.
    pub fn new(root: Arc<dyn Task>, pool: Arc<dyn WorkerPool>) -> Result<Self> {
        Self::with_budget(root, pool, ResourceBudget::unbounded())
    }

    /// Build a manager enforcing `budget` at admission.
    ///
    /// Fails when the graph is cyclic, a task name repeats, a demand
    /// exceeds the budget outright, a binding cannot be resolved, or
    /// output initialization fails. Nothing is dispatched on failure.
    pub fn with_budget(
        root: Arc<dyn Task>,
        pool: Arc<dyn WorkerPool>,
        budget: ResourceBudget,
    ) -> Result<Self> {
        if let Some(path) = graph::detect_cycle(&root) {
            return Err(Error::CyclicGraph { path });
        }
        let tasks = graph::ancestors(&root);

        let mut index = BTreeMap::new();
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.name().to_string(), i).is_some() {
                return Err(Error::DuplicateTask(task.name().to_string()));
            }
        }

        let mut entries = Vec::with_capacity(tasks.len());
        for task in &tasks {
            let demand = task.resources();
            if let Some((resource, amount, cap)) = budget.violation(&demand) {
                return Err(Error::UnsatisfiableResource {
                    task: task.name().to_string(),
                    resource,
                    demand: amount,
                    budget: cap,
                });
            }
            let parents = graph::parents(task)
                .iter()
                .map(|p| index[p.name()])
                .collect();
            let outputs = task.initialize_outputs().map_err(|source| Error::OutputInit {
                task: task.name().to_string(),
                source,
            })?;
            entries.push(TaskEntry {
                task: task.clone(),
                state: TaskState::Waiting,
                demand,
                parents,
                inputs: Vec::new(),
                outputs,
                handle: None,
                interrupted: false,
                error: None,
            });
        }

        // Bindings resolve to concrete datums now that every task's
        // outputs exist. External datums the caller already populated get
        // a verification attempt so they read as available up front.
        let mut resolved = Vec::with_capacity(entries.len());
        for task in &tasks {
            let mut inputs = Vec::new();
            for binding in task.inputs() {
                let datum = match binding.source {
                    BindingSource::External(datum) => {
                        if datum.state() == DatumState::Populated {
                            let _ = datum.verify();
                        }
                        datum
                    }
                    BindingSource::Output(output_ref) => {
                        let producer =
                            output_ref.producer().ok_or_else(|| Error::DanglingBinding {
                                task: task.name().to_string(),
                                input: binding.name.clone(),
                            })?;
                        entries[index[producer.name()]]
                            .outputs
                            .iter()
                            .find(|(name, _)| name == output_ref.output())
                            .map(|(_, datum)| datum.clone())
                            .ok_or_else(|| Error::UnknownOutput {
                                task: task.name().to_string(),
                                input: binding.name.clone(),
                                producer: producer.name().to_string(),
                                output: output_ref.output().to_string(),
                            })?
                    }
                };
                inputs.push((binding.name, datum));
            }
            resolved.push(inputs);
        }
        for (entry, inputs) in entries.iter_mut().zip(resolved) {
            entry.inputs = inputs;
        }

        let run_id = Uuid::new_v4();
        info!(run_id = %run_id, tasks = entries.len(), "workflow constructed");
        Ok(Self {
            run_id,
            entries,
            index,
            pool,
            resources: ResourcePool::new(budget),
            cancel: CancellationToken::new(),
            failed_latch: false,
            finished: false,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Cloneable handle that can cancel the run from another context.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Request cancellation; idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Snapshot of task states by name.
    pub fn status(&self) -> BTreeMap<String, TaskState> {
        self.entries
            .iter()
            .map(|e| (e.task.name().to_string(), e.state))
            .collect()
    }

    /// Initialized output datums of a task, in declaration order.
    pub fn outputs(&self, task: &str) -> Option<&[(String, DatumRef)]> {
        self.index.get(task).map(|&i| self.entries[i].outputs.as_slice())
    }

    /// Execute the workflow to a terminal state and return the report.
    ///
    /// A manager runs once; a second invocation is rejected.
    #[instrument(skip(self), fields(run_id = %self.run_id))]
    pub async fn run(&mut self) -> Result<RunReport> {
        if self.finished {
            return Err(Error::AlreadyRun);
        }
        let started_at = Utc::now();
        info!(tasks = self.entries.len(), "workflow started");

        let mut backoff = BACKOFF_MIN;
        loop {
            let mut progressed = self.reap();

            if self.cancel.is_cancelled() {
                progressed |= self.interrupt_running();
            }

            if !self.failed_latch {
                progressed |= self.admit();
            }

            if self.running_count() == 0 {
                // Nothing in flight and admission started nothing: every
                // remaining waiter is stuck.
                break;
            }

            backoff = if progressed {
                BACKOFF_MIN
            } else {
                (backoff * 2).min(BACKOFF_MAX)
            };
            tokio::time::sleep(backoff).await;
        }

        self.finished = true;
        let report = self.build_report(started_at);
        match report.outcome {
            Outcome::Complete => info!("workflow complete"),
            Outcome::Failed => warn!(
                failed = report.failures.len(),
                stuck = report.stuck.len(),
                "workflow failed"
            ),
        }
        Ok(report)
    }

    fn running_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.state == TaskState::Running)
            .count()
    }

    /// Poll every running worker and settle the finished ones.
    fn reap(&mut self) -> bool {
        let mut progressed = false;
        for i in 0..self.entries.len() {
            if self.entries[i].state != TaskState::Running {
                continue;
            }
            let poll = match self.entries[i].handle.as_mut() {
                Some(handle) => handle.poll(),
                None => continue,
            };
            if let WorkerPoll::Done(result) = poll {
                self.entries[i].handle = None;
                progressed = true;
                match result {
                    Ok(raw) => self.settle_success(i, raw),
                    Err(err) => self.settle_failure(i, task_error_from(err)),
                }
            }
        }
        progressed
    }

    /// Populate and verify the declared outputs, then mark complete.
    /// Downstream inputs read as available from here on.
    fn settle_success(&mut self, i: usize, raw: RawOutputs) {
        match finalize_outputs(&self.entries[i].outputs, raw) {
            Ok(()) => {
                self.entries[i].state = TaskState::Complete;
                let demand = self.entries[i].demand.clone();
                self.resources.release(&demand);
                info!(task = self.entries[i].task.name(), "task complete");
            }
            Err(err) => self.settle_failure(i, err),
        }
    }

    fn settle_failure(&mut self, i: usize, err: TaskError) {
        self.entries[i].task.fail_cleanup();
        warn!(task = self.entries[i].task.name(), error = %err, "task failed");
        self.entries[i].state = TaskState::Failed;
        self.entries[i].error = Some(err);
        let demand = self.entries[i].demand.clone();
        self.resources.release(&demand);
        self.failed_latch = true;
    }

    /// Forward a cancellation to running workers, once per task. Running
    /// tasks are allowed to drain; nothing new is admitted.
    fn interrupt_running(&mut self) -> bool {
        self.failed_latch = true;
        let mut progressed = false;
        for entry in &mut self.entries {
            if entry.state == TaskState::Running && !entry.interrupted {
                entry.interrupted = true;
                entry.task.interrupt_cleanup();
                if let Some(handle) = &entry.handle {
                    handle.interrupt();
                }
                warn!(task = entry.task.name(), "task interrupted");
                progressed = true;
            }
        }
        progressed
    }

    /// Start every ready task whose demand fits the free budget, in
    /// discovery order.
    fn admit(&mut self) -> bool {
        let mut progressed = false;
        for i in 0..self.entries.len() {
            if self.entries[i].state != TaskState::Waiting {
                continue;
            }
            if !self.is_ready(i) {
                continue;
            }
            if !self.resources.fits(&self.entries[i].demand) {
                debug!(
                    task = self.entries[i].task.name(),
                    "ready task deferred on resources"
                );
                continue;
            }
            self.dispatch(i);
            progressed = true;
        }
        progressed
    }

    fn is_ready(&self, i: usize) -> bool {
        let entry = &self.entries[i];
        entry
            .parents
            .iter()
            .all(|&p| self.entries[p].state == TaskState::Complete)
            && entry.inputs.iter().all(|(_, datum)| datum.try_verify())
    }

    fn dispatch(&mut self, i: usize) {
        let demand = self.entries[i].demand.clone();
        self.resources.acquire(&demand);
        let task = self.entries[i].task.clone();
        let inputs: BTreeMap<String, DatumRef> =
            self.entries[i].inputs.iter().cloned().collect();
        info!(task = task.name(), "task started");
        let job: Job = Box::new(move || {
            let args = task.collect_inputs(&inputs)?;
            task.run_logic(args)
        });
        self.entries[i].handle = Some(self.pool.submit(job));
        self.entries[i].state = TaskState::Running;
    }

    fn build_report(&self, started_at: DateTime<Utc>) -> RunReport {
        let failures: Vec<TaskFailure> = self
            .entries
            .iter()
            .filter(|e| e.state == TaskState::Failed)
            .map(|e| TaskFailure {
                task: e.task.name().to_string(),
                error: e
                    .error
                    .as_ref()
                    .map(|err| err.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
            })
            .collect();
        let stuck: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.state == TaskState::Waiting)
            .map(|e| e.task.name().to_string())
            .collect();
        let outcome = if self
            .entries
            .iter()
            .all(|e| e.state == TaskState::Complete)
        {
            Outcome::Complete
        } else {
            Outcome::Failed
        };
        RunReport {
            run_id: self.run_id,
            outcome,
            started_at,
            finished_at: Utc::now(),
            tasks: self.status(),
            failures,
            stuck,
        }
    }
}

fn finalize_outputs(
    outputs: &[(String, DatumRef)],
    mut raw: RawOutputs,
) -> std::result::Result<(), TaskError> {
    for (name, datum) in outputs {
        let pointer = raw
            .remove(name)
            .ok_or_else(|| TaskError::OutputMissing(name.clone()))?;
        datum.populate(pointer)?;
        datum.verify()?;
    }
    Ok(())
}

fn task_error_from(err: WorkerError) -> TaskError {
    match err {
        WorkerError::Job(err) => match err.downcast::<TaskError>() {
            Ok(task_err) => task_err,
            Err(err) => TaskError::Body(format!("{err:#}")),
        },
        WorkerError::Crashed(msg) => TaskError::WorkerCrash(msg),
        WorkerError::Interrupted => TaskError::Interrupted,
    }
}
