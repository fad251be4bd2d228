// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_info::ScheduledTask;
use crate::engine::TaskName;

/// Structured result of a single scheduler "step".
///
/// Tests can step a graph by hand and assert on exactly what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that became Ready in this step and should be dispatched.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were newly marked Failed (including argument resolution
    /// failures).
    pub newly_failed: Vec<TaskName>,
    /// Tasks that were newly marked Skipped.
    pub newly_skipped: Vec<TaskName>,
    /// Dispatched tasks whose execution should be cancelled.
    pub to_cancel: Vec<TaskName>,
    /// Whether this step left every task in a terminal state.
    pub graph_finished: bool,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_scheduled.is_empty()
            && self.newly_failed.is_empty()
            && self.newly_skipped.is_empty()
            && self.to_cancel.is_empty()
    }
}
