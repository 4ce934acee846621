//! Tokio-backed pool running jobs on blocking threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use weft_dag::{Job, RawOutputs, WorkerError, WorkerHandle, WorkerPoll, WorkerPool};

type ResultSlot = Arc<Mutex<Option<Result<RawOutputs, WorkerError>>>>;

/// Worker pool that executes jobs on tokio's blocking thread pool,
/// bounded to a fixed number of concurrently running jobs.
///
/// Interruption is cooperative: a job that has not started yet is dropped
/// with [`WorkerError::Interrupted`]; a job already on a thread runs to
/// completion and is expected to observe its task's own interrupt signal.
pub struct BlockingPool {
    runtime: tokio::runtime::Handle,
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    /// Pool bounded to `capacity` concurrently running jobs.
    ///
    /// Must be created inside a tokio runtime; the pool keeps a handle to
    /// it for dispatch.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            runtime: tokio::runtime::Handle::current(),
            permits: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Pool sized to the host's available parallelism.
    pub fn with_default_capacity() -> Arc<Self> {
        let capacity = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::new(capacity)
    }
}

impl WorkerPool for BlockingPool {
    fn submit(&self, job: Job) -> Box<dyn WorkerHandle> {
        let slot: ResultSlot = Arc::new(Mutex::new(None));
        let interrupted = Arc::new(AtomicBool::new(false));
        let permits = self.permits.clone();
        let task_slot = slot.clone();
        let task_interrupted = interrupted.clone();
        self.runtime.spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    *task_slot.lock() =
                        Some(Err(WorkerError::Crashed("pool shut down".into())));
                    return;
                }
            };
            if task_interrupted.load(Ordering::SeqCst) {
                debug!("job interrupted before start");
                *task_slot.lock() = Some(Err(WorkerError::Interrupted));
                return;
            }
            let outcome = tokio::task::spawn_blocking(move || job()).await;
            drop(permit);
            let result = match outcome {
                Ok(Ok(outputs)) => Ok(outputs),
                Ok(Err(err)) => Err(WorkerError::Job(err)),
                Err(join_err) => Err(WorkerError::Crashed(describe_join_error(join_err))),
            };
            *task_slot.lock() = Some(result);
        });
        Box::new(BlockingHandle { slot, interrupted })
    }

    fn shutdown(&self) {
        self.permits.close();
    }
}

struct BlockingHandle {
    slot: ResultSlot,
    interrupted: Arc<AtomicBool>,
}

impl WorkerHandle for BlockingHandle {
    fn poll(&mut self) -> WorkerPoll {
        match self.slot.lock().take() {
            Some(result) => WorkerPoll::Done(result),
            None => WorkerPoll::Pending,
        }
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

fn describe_join_error(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(msg) = payload.downcast_ref::<&str>() {
            format!("worker panicked: {msg}")
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            format!("worker panicked: {msg}")
        } else {
            "worker panicked".to_string()
        }
    } else {
        "worker task cancelled".to_string()
    }
}
