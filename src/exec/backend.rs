// src/exec/backend.rs

//! Pluggable task runner abstraction.
//!
//! The runtime talks to a `TaskRunner` for every script task. This makes it
//! easy to swap in a fake runner in tests while keeping the production
//! process runner in [`crate::exec::shell`].
//!
//! - `ShellRunner` is the default implementation used by the `dagweave`
//!   binary. It runs the script body as an OS process.
//! - Tests provide their own `TaskRunner` that, for example, records which
//!   tasks were dispatched and returns scripted results.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::engine::TaskName;
use crate::expr::WorkflowContext;
use crate::template::ScriptSpec;

/// Everything a runner needs to execute one script task.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Task name within its graph.
    pub task: TaskName,
    /// Script template being executed.
    pub template: String,
    /// Bound input values, defaults applied.
    pub inputs: BTreeMap<String, String>,
    /// Opaque execution specification.
    pub script: ScriptSpec,
    /// Paths of the template's path-capture outputs. The runner reports
    /// what it finds at each of them.
    pub capture_paths: Vec<String>,
    pub workflow: Arc<WorkflowContext>,
}

/// Successful runner result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnerOutput {
    /// Primary scalar result.
    pub result: String,
    /// Captured value per path. A path missing here was not produced.
    pub captured: BTreeMap<String, String>,
}

/// Runner-reported failure with a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RunnerFailure {
    pub message: String,
    pub exit_code: Option<i32>,
}

impl RunnerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: None,
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }
}

pub type RunFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RunnerOutput, RunnerFailure>> + Send + 'a>>;

/// Trait abstracting how a script task's body is executed.
///
/// The returned future may be dropped at any time (cancellation, timeout);
/// implementations must release their resources on drop.
pub trait TaskRunner: Send + Sync {
    fn run(&self, request: RunRequest) -> RunFuture<'_>;
}
