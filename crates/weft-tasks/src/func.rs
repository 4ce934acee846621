//! Closure-bodied tasks with in-memory outputs.

use std::sync::Arc;

use parking_lot::Mutex;

use weft_dag::{
    DatumRef, InputBinding, RawOutputs, ResourceDemand, Task, TaskArgs,
};

use crate::value::ValueDatum;

type Body = Box<dyn Fn(TaskArgs) -> anyhow::Result<RawOutputs> + Send + Sync>;
type Observer = Box<dyn Fn() + Send + Sync>;

/// A task whose body is a closure over in-memory values.
///
/// Outputs are in-memory datums created at initialization. Inputs can be
/// bound at build time or, through [`FnTask::bind`], after the task has
/// been shared.
pub struct FnTask {
    name: String,
    bindings: Mutex<Vec<InputBinding>>,
    output_names: Vec<String>,
    demand: ResourceDemand,
    body: Body,
    on_interrupt: Option<Observer>,
    on_fail: Option<Observer>,
}

impl FnTask {
    pub fn new(
        name: impl Into<String>,
        body: impl Fn(TaskArgs) -> anyhow::Result<RawOutputs> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            bindings: Mutex::new(Vec::new()),
            output_names: Vec::new(),
            demand: ResourceDemand::none(),
            body: Box::new(body),
            on_interrupt: None,
            on_fail: None,
        }
    }

    /// Bind an input to an external datum (builder pattern).
    pub fn with_input(self, name: impl Into<String>, datum: DatumRef) -> Self {
        self.bindings.lock().push(InputBinding::external(name, datum));
        self
    }

    /// Bind an input to a named output of an upstream task.
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

    /// Declare a named output (builder pattern).
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.output_names.push(name.into());
        self
    }

    /// Declare resource demand (builder pattern).
    pub fn with_resource(mut self, resource: impl Into<String>, amount: u64) -> Self {
        self.demand = self.demand.clone().with(resource, amount);
        self
    }

    /// Observe cancellation-time cleanup.
    pub fn on_interrupt(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_interrupt = Some(Box::new(observer));
        self
    }

    /// Observe failure-time cleanup.
    pub fn on_fail(mut self, observer: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_fail = Some(Box::new(observer));
        self
    }

    /// Finish the builder as a shareable task handle.
    pub fn build(self) -> Arc<dyn Task> {
        Arc::new(self)
    }

    /// Add a binding to a task that is already shared. Bindings resolve
    /// when a manager is constructed, so sibling tasks can be wired after
    /// sharing.
    pub fn bind(&self, binding: InputBinding) {
        self.bindings.lock().push(binding);
    }
}

impl Task for FnTask {
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
            .output_names
            .iter()
            .map(|name| (name.clone(), ValueDatum::empty()))
            .collect())
    }

    fn run_logic(&self, args: TaskArgs) -> anyhow::Result<RawOutputs> {
        (self.body)(args)
    }

    fn interrupt_cleanup(&self) {
        if let Some(observer) = &self.on_interrupt {
            observer();
        }
    }

    fn fail_cleanup(&self) {
        if let Some(observer) = &self.on_fail {
            observer();
        }
    }
}
