// src/engine/report.rs

use std::collections::BTreeMap;
use std::fmt;

use crate::dag::TaskState;
use crate::engine::FailureReason;

/// Final phase of a template run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Succeeded,
    Failed,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Succeeded => write!(f, "Succeeded"),
            RunPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Report of one template execution: the entrypoint, or a sub-graph invoked
/// by a DAG task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRun {
    pub template: String,
    pub phase: RunPhase,
    /// Bound input values.
    pub inputs: BTreeMap<String, String>,
    /// Aggregated output parameters. Empty when the run failed.
    pub outputs: BTreeMap<String, String>,
    /// Primary result; only script templates have one.
    pub result: Option<String>,
    /// Per-path captured values visible to a parent graph.
    pub captured: BTreeMap<String, String>,
    /// Task snapshots in topological order (empty for script templates).
    pub tasks: Vec<TaskSnapshot>,
    /// Human-readable reason when the run failed.
    pub failure: Option<String>,
}

impl TemplateRun {
    pub fn succeeded(&self) -> bool {
        self.phase == RunPhase::Succeeded
    }

    pub fn task(&self, name: &str) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Look up a task by a dotted path through nested runs, e.g.
    /// `"dag_a.B"`.
    pub fn find(&self, path: &str) -> Option<&TaskSnapshot> {
        let mut parts = path.split('.');
        let mut current = self.task(parts.next()?)?;
        for part in parts {
            current = current.child.as_ref()?.task(part)?;
        }
        Some(current)
    }
}

/// Final state of one task of a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub name: String,
    pub template: String,
    pub state: TaskState,
    /// Resolved arguments; `None` if the task never became Ready.
    pub arguments: Option<BTreeMap<String, String>>,
    pub result: Option<String>,
    pub outputs: BTreeMap<String, String>,
    pub failure: Option<FailureReason>,
    /// Report of the sub-graph, for tasks invoking a DAG template.
    pub child: Option<Box<TemplateRun>>,
}
