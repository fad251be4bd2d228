// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use crate::dag::{ScheduledTask, Scheduler, SchedulerStep};
use crate::engine::{TaskName, TaskOutcome};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Start executing these tasks.
    DispatchTasks(Vec<ScheduledTask>),
    /// Cancel these dispatched tasks.
    CancelTasks(Vec<TaskName>),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the graph loop should keep running (some task is not
    /// terminal yet).
    pub keep_running: bool,
}

/// Evaluate the initial Ready set of a fresh graph.
pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_start();
    into_core_step(step)
}

/// A dispatched task acquired its slot.
pub fn handle_task_started(scheduler: &mut Scheduler, task: TaskName) -> CoreStep {
    let step = scheduler.step_started(&task);
    into_core_step(step)
}

/// Handle a task completion event.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let step = scheduler.step_completion(&task, outcome);
    into_core_step(step)
}

/// Handle a shutdown request: nothing new is dispatched and running tasks
/// are cancelled. The loop keeps running until they report back.
pub fn handle_shutdown(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.step_shutdown();
    into_core_step(step)
}

fn into_core_step(step: SchedulerStep) -> CoreStep {
    let mut commands = Vec::new();

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }
    if !step.to_cancel.is_empty() {
        commands.push(CoreCommand::CancelTasks(step.to_cancel));
    }

    CoreStep {
        commands,
        keep_running: !step.graph_finished,
    }
}
