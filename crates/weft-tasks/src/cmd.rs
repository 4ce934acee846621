//! Shell-command tasks producing file outputs.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, bail};
use parking_lot::Mutex;
use tracing::debug;

use weft_dag::{
    DatumRef, InputBinding, Pointer, RawOutputs, ResourceDemand, Task, TaskArgs,
};

use crate::file::FileDatum;

/// A task that runs a program and writes declared output files.
///
/// Input pointers are exported to the child as `WEFT_IN_<NAME>` and
/// output paths as `WEFT_OUT_<NAME>` environment variables; the command
/// is expected to write every declared output before exiting zero.
/// Interruption is cooperative: the body polls the child and kills it
/// once [`Task::interrupt_cleanup`] has fired.
pub struct CmdTask {
    name: String,
    program: String,
    args: Vec<String>,
    bindings: Mutex<Vec<InputBinding>>,
    outputs: Vec<(String, PathBuf)>,
    demand: ResourceDemand,
    interrupted: AtomicBool,
}

impl CmdTask {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            bindings: Mutex::new(Vec::new()),
            outputs: Vec::new(),
            demand: ResourceDemand::none(),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Append a program argument (builder pattern).
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Bind an input to an external datum.
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

    /// Declare a named file output the command will write at `path`.
    pub fn with_output(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.outputs.push((name.into(), path.into()));
        self
    }

    /// Declare resource demand.
    pub fn with_resource(mut self, resource: impl Into<String>, amount: u64) -> Self {
        self.demand = self.demand.clone().with(resource, amount);
        self
    }

    pub fn build(self) -> Arc<dyn Task> {
        Arc::new(self)
    }
}

impl Task for CmdTask {
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
            .map(|(name, _)| (name.clone(), FileDatum::empty()))
            .collect())
    }

    fn run_logic(&self, args: TaskArgs) -> anyhow::Result<RawOutputs> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (name, pointer) in &args {
            command.env(format!("WEFT_IN_{}", env_key(name)), pointer_text(pointer));
        }
        for (name, path) in &self.outputs {
            command.env(format!("WEFT_OUT_{}", env_key(name)), path);
        }
        command.stdout(Stdio::null()).stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program))?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if self.interrupted.load(Ordering::SeqCst) {
                debug!(task = %self.name, "killing interrupted command");
                let _ = child.kill();
                let _ = child.wait();
                bail!("command interrupted");
            }
            std::thread::sleep(Duration::from_millis(10));
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut pipe) = child.stderr.take() {
                use std::io::Read;
                let _ = pipe.read_to_string(&mut stderr);
            }
            bail!("`{}` exited with {status}: {}", self.program, stderr.trim());
        }

        Ok(self
            .outputs
            .iter()
            .map(|(name, path)| (name.clone(), Pointer::Path(path.clone())))
            .collect())
    }

    fn interrupt_cleanup(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn pointer_text(pointer: &Pointer) -> String {
    match pointer {
        Pointer::Value(value) => value.to_string(),
        Pointer::Path(path) => path.to_string_lossy().into_owned(),
        Pointer::Uri(uri) => uri.clone(),
    }
}
