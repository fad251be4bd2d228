// src/dag/state_manager.rs

//! Per-run state transitions for the tasks of one graph.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::dag::graph::TaskNode;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::scope::GraphScope;
use crate::dag::task_info::{ScheduledTask, TaskInstance, TaskState};
use crate::engine::{FailureReason, TaskName, TaskOutcome};
use crate::errors::Result;
use crate::expr::{WorkflowContext, resolve};

/// Applies state transitions to the task map of a graph.
///
/// Holds only borrows; the [`crate::dag::Scheduler`] owns the state and
/// creates a manager per step.
pub struct StateManager<'a> {
    graph: &'a DagGraph,
    workflow: &'a WorkflowContext,
    tasks: &'a mut HashMap<TaskName, TaskInstance>,
    next_seq: &'a mut u64,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a DagGraph,
        workflow: &'a WorkflowContext,
        tasks: &'a mut HashMap<TaskName, TaskInstance>,
        next_seq: &'a mut u64,
    ) -> Self {
        Self {
            graph,
            workflow,
            tasks,
            next_seq,
        }
    }

    /// Move Pending tasks forward in one pass over the topological order.
    ///
    /// Every upstream task of a node comes earlier in the order, so a single
    /// pass sees all transitions it causes itself (skips cascading down a
    /// chain, resolution failures skipping dependents).
    pub fn advance(&mut self, step: &mut SchedulerStep) {
        let graph = self.graph;
        for node in graph.nodes() {
            if self.state_of(&node.name) != Some(TaskState::Pending) {
                continue;
            }

            match self.readiness(node) {
                None => {}
                Some(false) => {
                    self.set_state(&node.name, TaskState::Skipped);
                    warn!(
                        graph = %graph.template_name(),
                        task = %node.name,
                        "dependencies can no longer be satisfied; skipping task"
                    );
                    step.newly_skipped.push(node.name.clone());
                }
                Some(true) => match self.resolve_arguments(node) {
                    Ok(arguments) => {
                        debug!(
                            graph = %graph.template_name(),
                            task = %node.name,
                            ?arguments,
                            "dependencies satisfied; marking Ready"
                        );
                        if let Some(instance) = self.tasks.get_mut(&node.name) {
                            instance.state = TaskState::Ready;
                            instance.arguments = Some(arguments.clone());
                        }
                        step.newly_scheduled.push(ScheduledTask {
                            name: node.name.clone(),
                            template: node.template.clone(),
                            arguments,
                        });
                    }
                    Err(err) => {
                        self.fail(&node.name, FailureReason::Resolution(err.to_string()));
                        step.newly_failed.push(node.name.clone());
                    }
                },
            }
        }
    }

    /// Three-valued readiness of a Pending task: the `depends` predicate
    /// AND "every implicit producer Succeeded".
    fn readiness(&self, node: &TaskNode) -> Option<bool> {
        let outcome_of = |task: &str| self.tasks.get(task).and_then(|t| t.state.outcome());

        let explicit = match &node.depends {
            Some(pred) => pred.evaluate_with(&outcome_of),
            None => Some(true),
        };

        let mut implicit = Some(true);
        for producer in &node.producers {
            match self.state_of(producer) {
                Some(TaskState::Succeeded) => {}
                Some(TaskState::Failed) | Some(TaskState::Skipped) => {
                    implicit = Some(false);
                    break;
                }
                _ => implicit = None,
            }
        }

        match (explicit, implicit) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        }
    }

    fn resolve_arguments(&self, node: &TaskNode) -> Result<BTreeMap<String, String>> {
        let scope = GraphScope::new(self.workflow, self.graph.inputs(), self.tasks);
        node.arguments
            .iter()
            .map(|(name, expr)| resolve(expr, &scope).map(|value| (name.clone(), value)))
            .collect()
    }

    /// Ready -> Running. Returns false if the task was not Ready.
    pub fn mark_started(&mut self, task: &str) -> bool {
        match self.tasks.get_mut(task) {
            Some(instance) if instance.state == TaskState::Ready => {
                instance.state = TaskState::Running;
                info!(
                    graph = %self.graph.template_name(),
                    task = %task,
                    template = %instance.template,
                    "task started"
                );
                true
            }
            Some(instance) => {
                debug!(
                    task = %task,
                    state = ?instance.state,
                    "start reported for task that is not Ready; ignoring"
                );
                false
            }
            None => {
                warn!(task = %task, "start reported for unknown task; ignoring");
                false
            }
        }
    }

    /// Record a runner outcome. Returns the new state, or `None` if the
    /// task was already terminal or unknown.
    pub fn complete(&mut self, task: &str, outcome: TaskOutcome) -> Option<TaskState> {
        let current = self.state_of(task);
        match current {
            Some(TaskState::Ready) | Some(TaskState::Running) => {}
            Some(state) => {
                debug!(
                    task = %task,
                    state = ?state,
                    "completion for task that is not in flight; ignoring"
                );
                return None;
            }
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
                return None;
            }
        }

        match outcome {
            TaskOutcome::Succeeded(outputs) => {
                let seq = self.bump_seq();
                if let Some(instance) = self.tasks.get_mut(task) {
                    info!(
                        graph = %self.graph.template_name(),
                        task = %task,
                        result = ?outputs.result,
                        "task succeeded"
                    );
                    instance.state = TaskState::Succeeded;
                    instance.outputs = Some(outputs);
                    instance.completed_seq = Some(seq);
                }
                Some(TaskState::Succeeded)
            }
            TaskOutcome::Failed(reason) => {
                self.fail(task, reason);
                Some(TaskState::Failed)
            }
        }
    }

    fn fail(&mut self, task: &str, reason: FailureReason) {
        let seq = self.bump_seq();
        if let Some(instance) = self.tasks.get_mut(task) {
            warn!(
                graph = %self.graph.template_name(),
                task = %task,
                reason = %reason,
                code = reason.code(),
                "task failed"
            );
            instance.state = TaskState::Failed;
            instance.failure = Some(reason);
            instance.completed_seq = Some(seq);
        }
    }

    /// Skip every Pending and Ready task and request cancellation of every
    /// dispatched one (Ready or Running).
    pub fn cancel_remaining(&mut self, step: &mut SchedulerStep) {
        let graph = self.graph;
        for name in graph.topological_order() {
            let Some(instance) = self.tasks.get_mut(name) else {
                continue;
            };
            match instance.state {
                TaskState::Pending => {
                    instance.state = TaskState::Skipped;
                    step.newly_skipped.push(name.clone());
                }
                TaskState::Ready => {
                    instance.state = TaskState::Skipped;
                    step.newly_skipped.push(name.clone());
                    step.to_cancel.push(name.clone());
                }
                TaskState::Running => {
                    step.to_cancel.push(name.clone());
                }
                TaskState::Succeeded | TaskState::Failed | TaskState::Skipped => {}
            }
        }

        if !step.newly_skipped.is_empty() || !step.to_cancel.is_empty() {
            warn!(
                graph = %self.graph.template_name(),
                skipped = ?step.newly_skipped,
                cancelling = ?step.to_cancel,
                "cancelling remaining tasks"
            );
        }
    }

    /// Names of Running tasks, in topological order.
    pub fn running(&self) -> Vec<TaskName> {
        self.graph
            .topological_order()
            .iter()
            .filter(|name| self.state_of(name) == Some(TaskState::Running))
            .cloned()
            .collect()
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal())
    }

    pub fn any_failed(&self) -> bool {
        self.tasks.values().any(|t| t.state == TaskState::Failed)
    }

    /// Whether any task can still be dispatched.
    pub fn any_schedulable(&self) -> bool {
        self.tasks
            .values()
            .any(|t| matches!(t.state, TaskState::Pending | TaskState::Ready))
    }

    fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|t| t.state)
    }

    fn set_state(&mut self, task: &str, state: TaskState) {
        if let Some(instance) = self.tasks.get_mut(task) {
            instance.state = state;
        }
    }

    fn bump_seq(&mut self) -> u64 {
        *self.next_seq += 1;
        *self.next_seq
    }
}
