// src/engine/mod.rs

//! Orchestration engine for dagweave.
//!
//! This module ties together:
//! - the per-graph scheduler ([`crate::dag::Scheduler`])
//! - the task runner ([`crate::exec::TaskRunner`])
//! - the runtime event loop of each graph that reacts to:
//!   - tasks starting (after acquiring a parallelism slot)
//!   - task completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell,
//! including recursive execution of sub-graphs, is implemented in
//! [`runtime`]. [`report`] holds the run report types.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Values a Succeeded task exposes to its siblings and to output
/// aggregation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutputs {
    /// Primary scalar result (script stdout). DAG tasks have none.
    pub result: Option<String>,
    /// Declared output parameters by name.
    pub parameters: BTreeMap<String, String>,
    /// Values the runner reported per capture path.
    pub captured: BTreeMap<String, String>,
}

/// Why a task Failed. Each variant is a distinct reason code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("runner failed: {message}")]
    Runner {
        message: String,
        exit_code: Option<i32>,
    },

    #[error("output '{output}' was not captured at '{path}'")]
    CaptureMissing { output: String, path: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("sub-graph '{template}' failed: {message}")]
    Subgraph { template: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("could not resolve arguments: {0}")]
    Resolution(String),
}

impl FailureReason {
    /// Stable short code for logs and reports.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::Runner { .. } => "runner",
            FailureReason::CaptureMissing { .. } => "capture-missing",
            FailureReason::Timeout(_) => "timeout",
            FailureReason::Subgraph { .. } => "subgraph",
            FailureReason::Cancelled => "cancelled",
            FailureReason::Resolution(_) => "resolution",
        }
    }
}

/// Outcome of a dispatched task for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Succeeded(TaskOutputs),
    Failed(FailureReason),
}

/// Runtime options shared by every graph of a run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// Maximum number of script tasks running at once, across all nesting
    /// levels. `None` means unlimited.
    pub parallelism: Option<usize>,
    /// Default per-task timeout for script tasks.
    pub task_timeout: Option<Duration>,
    /// Fail-fast default for DAG templates that do not set it.
    pub fail_fast: bool,
}

/// Events flowing into a graph's runtime loop from its task jobs.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// A dispatched task got its slot and started executing.
    TaskStarted { task: TaskName },
    /// A task finished. `child` carries the report of a sub-graph run.
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
        child: Option<Box<TemplateRun>>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

pub mod core;
pub mod event_handlers;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use report::{RunPhase, TaskSnapshot, TemplateRun};
pub use runtime::{Runtime, ShutdownHandle};
