// src/dag/task_info.rs

//! Per-task run state.

use std::collections::BTreeMap;

use crate::depends::Outcome;
use crate::engine::{FailureReason, TaskName, TaskOutputs};

/// State of a task instance within one graph execution.
///
/// ```text
/// Pending -> Ready -> Running -> Succeeded | Failed
///    |         |
///    +---------+--> Skipped
/// ```
///
/// A Pending task may also go straight to Failed when its arguments cannot
/// be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting on upstream tasks.
    Pending,
    /// Dependencies satisfied and arguments resolved; handed to the runtime
    /// but not started yet (e.g. waiting for a parallelism slot).
    Ready,
    /// Runner (or sub-graph) in progress.
    Running,
    Succeeded,
    Failed,
    /// Will never run: its dependencies can no longer be satisfied, or the
    /// graph is being cancelled.
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }

    /// Terminal outcome as seen by `depends` predicates.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            TaskState::Succeeded => Some(Outcome::Succeeded),
            TaskState::Failed => Some(Outcome::Failed),
            TaskState::Skipped => Some(Outcome::Skipped),
            TaskState::Pending | TaskState::Ready | TaskState::Running => None,
        }
    }
}

/// Per-run record of a task.
#[derive(Debug, Clone)]
pub struct TaskInstance {
    pub name: TaskName,
    pub template: String,
    pub state: TaskState,
    /// Arguments as resolved when the task became Ready.
    pub arguments: Option<BTreeMap<String, String>>,
    /// Set once the task Succeeded.
    pub outputs: Option<TaskOutputs>,
    /// Set once the task Failed.
    pub failure: Option<FailureReason>,
    /// Completion sequence number within the graph; later completions have
    /// larger numbers.
    pub completed_seq: Option<u64>,
}

impl TaskInstance {
    pub fn new(name: TaskName, template: String) -> Self {
        Self {
            name,
            template,
            state: TaskState::Pending,
            arguments: None,
            outputs: None,
            failure: None,
            completed_seq: None,
        }
    }
}

/// A task the scheduler wants the runtime to run now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub template: String,
    /// Resolved argument values, not yet bound to the callee's defaults.
    pub arguments: BTreeMap<String, String>,
}
