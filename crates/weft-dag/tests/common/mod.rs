//! Shared fixtures: a permissive datum backend, a scriptable stub task,
//! and a pool that runs jobs inline at submission.
#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use weft_dag::{
    DatumBackend, DatumRef, InputBinding, Job, Pointer, RawOutputs, ResourceDemand, Task,
    TaskArgs, WorkerError, WorkerHandle, WorkerPoll, WorkerPool, short_hash,
};

/// Backend that accepts any pointer and always verifies.
pub struct PlainBackend;

impl DatumBackend for PlainBackend {
    fn validate_format(&self, _pointer: &Pointer) -> bool {
        true
    }

    fn verify_available(&self, _pointer: &Pointer) -> bool {
        true
    }

    fn clear(&self, _pointer: &Pointer) -> anyhow::Result<()> {
        Ok(())
    }

    fn quickhash(&self, pointer: &Pointer) -> String {
        short_hash(pointer.describe().as_bytes())
    }
}

/// Order log shared between stub tasks.
pub type RunLog = Arc<Mutex<Vec<String>>>;

pub fn run_log() -> RunLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Task with configurable wiring whose body records its run and emits a
/// string value per declared output.
pub struct StubTask {
    name: String,
    bindings: Mutex<Vec<InputBinding>>,
    outputs: Vec<String>,
    demand: ResourceDemand,
    fail_with: Option<String>,
    log: Option<RunLog>,
}

impl StubTask {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bindings: Mutex::new(Vec::new()),
            outputs: Vec::new(),
            demand: ResourceDemand::none(),
            fail_with: None,
            log: None,
        }
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn with_input(self, name: impl Into<String>, datum: DatumRef) -> Self {
        self.bindings.lock().push(InputBinding::external(name, datum));
        self
    }

    pub fn with_upstream(
        self,
        name: impl Into<String>,
        producer: &Arc<dyn Task>,
        output: impl Into<String>,
    ) -> Self {
        self.bindings
            .lock()
            .push(InputBinding::output(name, producer, output));
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>, amount: u64) -> Self {
        self.demand = self.demand.clone().with(resource, amount);
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn logged(mut self, log: &RunLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn build(self) -> Arc<dyn Task> {
        Arc::new(self)
    }

    /// Late binding on a shared task.
    pub fn bind(&self, binding: InputBinding) {
        self.bindings.lock().push(binding);
    }
}

impl Task for StubTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<InputBinding> {
        self.bindings.lock().clone()
    }

    fn resources(&self) -> ResourceDemand {
        self.demand.clone()
    }

    fn initialize_outputs(&self) -> anyhow::Result<Vec<(String, DatumRef)>> {
        Ok(self
            .outputs
            .iter()
            .map(|name| (name.clone(), weft_dag::Datum::new(PlainBackend)))
            .collect())
    }

    fn run_logic(&self, _args: TaskArgs) -> anyhow::Result<RawOutputs> {
        if let Some(log) = &self.log {
            log.lock().push(self.name.clone());
        }
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }
        Ok(self
            .outputs
            .iter()
            .map(|name| {
                let text = format!("{}.{}", self.name, name);
                (name.clone(), Pointer::Value(text.into()))
            })
            .collect())
    }
}

/// Pool that runs each job inline at submission; polling yields the
/// result on the first call. Keeps manager tests deterministic.
pub struct SyncPool;

impl WorkerPool for SyncPool {
    fn submit(&self, job: Job) -> Box<dyn WorkerHandle> {
        Box::new(SyncHandle {
            result: Some(job().map_err(WorkerError::Job)),
        })
    }

    fn shutdown(&self) {}
}

struct SyncHandle {
    result: Option<Result<RawOutputs, WorkerError>>,
}

impl WorkerHandle for SyncHandle {
    fn poll(&mut self) -> WorkerPoll {
        match self.result.take() {
            Some(result) => WorkerPoll::Done(result),
            None => WorkerPoll::Pending,
        }
    }

    fn interrupt(&self) {}
}
