//! Run reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskState;

/// Terminal outcome of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every ancestor of the root completed and its outputs are available.
    Complete,
    /// At least one task failed, was interrupted, or never became ready.
    Failed,
}

/// A task that reached the failed state, with its retained cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: String,
    pub error: String,
}

/// Final snapshot of a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Final state of every task, by name.
    pub tasks: BTreeMap<String, TaskState>,
    /// Tasks that failed, in discovery order.
    pub failures: Vec<TaskFailure>,
    /// Tasks that never became ready: descendants of failures, or tasks
    /// whose inputs never verified. A non-empty stuck set with no
    /// failures and no cancellation is a deadlock diagnosis.
    pub stuck: Vec<String>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.outcome == Outcome::Complete
    }
}
