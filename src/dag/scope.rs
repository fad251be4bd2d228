// src/dag/scope.rs

use std::collections::{BTreeMap, HashMap};

use crate::dag::task_info::{TaskInstance, TaskState};
use crate::engine::TaskName;
use crate::expr::{Reference, Scope, WorkflowContext};

/// Scope of expressions evaluated inside a graph: task arguments and the
/// DAG template's expression outputs.
///
/// Task outputs are visible only once the task has Succeeded.
#[derive(Debug, Clone, Copy)]
pub struct GraphScope<'a> {
    pub workflow: &'a WorkflowContext,
    pub inputs: &'a BTreeMap<String, String>,
    pub tasks: &'a HashMap<TaskName, TaskInstance>,
}

impl<'a> GraphScope<'a> {
    pub fn new(
        workflow: &'a WorkflowContext,
        inputs: &'a BTreeMap<String, String>,
        tasks: &'a HashMap<TaskName, TaskInstance>,
    ) -> Self {
        Self {
            workflow,
            inputs,
            tasks,
        }
    }

    fn succeeded(&self, task: &str) -> Result<&'a TaskInstance, String> {
        let instance = self
            .tasks
            .get(task)
            .ok_or_else(|| format!("no task named '{task}' in this graph"))?;

        if instance.state == TaskState::Succeeded {
            Ok(instance)
        } else {
            Err(format!(
                "task '{task}' has not succeeded (state: {:?})",
                instance.state
            ))
        }
    }
}

impl Scope for GraphScope<'_> {
    fn lookup(&self, reference: &Reference) -> Result<&str, String> {
        match reference {
            Reference::Input(name) => self
                .inputs
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| format!("no input parameter named '{name}'")),
            Reference::TaskOutput { task, parameter } => self
                .succeeded(task)?
                .outputs
                .as_ref()
                .and_then(|o| o.parameters.get(parameter))
                .map(String::as_str)
                .ok_or_else(|| format!("task '{task}' produced no output '{parameter}'")),
            Reference::TaskResult { task } => self
                .succeeded(task)?
                .outputs
                .as_ref()
                .and_then(|o| o.result.as_deref())
                .ok_or_else(|| format!("task '{task}' produced no result")),
            Reference::WorkflowName => Ok(&self.workflow.name),
            Reference::WorkflowParameter(name) => self.workflow.parameter(name),
        }
    }
}
