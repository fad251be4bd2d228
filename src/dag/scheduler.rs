// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::DagGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::scope::GraphScope;
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{TaskInstance, TaskState};
use crate::engine::{TaskName, TaskOutcome};
use crate::expr::WorkflowContext;

/// Overall status of a graph execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphStatus {
    /// Some task is not terminal yet.
    Running,
    /// Every task is terminal and every non-Skipped task Succeeded.
    Succeeded,
    /// Every task is terminal and at least one Failed, or the graph was
    /// shut down.
    Failed,
}

/// Scheduler holds one instantiated graph plus the mutable per-task state of
/// its execution.
///
/// It is responsible for:
/// - deciding when a Pending task is Ready (three-valued `depends` plus
///   implicit producers) and resolving its arguments at that point
/// - recording runner outcomes
/// - skipping tasks whose dependencies can never be satisfied
/// - fail-fast and shutdown cancellation
///
/// It performs no IO; the engine feeds it events and executes the tasks it
/// returns.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    workflow: Arc<WorkflowContext>,
    tasks: HashMap<TaskName, TaskInstance>,
    /// Completion sequence counter.
    seq: u64,
    /// Set once fail-fast or shutdown has cancelled the remaining tasks.
    cancelling: bool,
    /// Set by a shutdown request.
    interrupted: bool,
    started: bool,
}

impl Scheduler {
    pub fn new(graph: DagGraph, workflow: Arc<WorkflowContext>) -> Self {
        let tasks = graph
            .nodes()
            .map(|node| {
                (
                    node.name.clone(),
                    TaskInstance::new(node.name.clone(), node.template.clone()),
                )
            })
            .collect();

        Self {
            graph,
            workflow,
            tasks,
            seq: 0,
            cancelling: false,
            interrupted: false,
            started: false,
        }
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn workflow(&self) -> &WorkflowContext {
        &self.workflow
    }

    /// Current state of `task`, or `None` if the graph has no such task.
    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|t| t.state)
    }

    pub fn instance(&self, task: &str) -> Option<&TaskInstance> {
        self.tasks.get(task)
    }

    /// Task instances in topological order.
    pub fn instances(&self) -> impl Iterator<Item = &TaskInstance> {
        self.graph
            .topological_order()
            .iter()
            .filter_map(|name| self.tasks.get(name))
    }

    /// Scope for resolving expressions against the current state of the
    /// graph (used for the template's expression outputs).
    pub fn scope(&self) -> GraphScope<'_> {
        GraphScope::new(&self.workflow, self.graph.inputs(), &self.tasks)
    }

    /// Whether a shutdown request stopped this graph.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal())
    }

    pub fn status(&self) -> GraphStatus {
        if !self.is_finished() {
            GraphStatus::Running
        } else if self.interrupted || self.tasks.values().any(|t| t.state == TaskState::Failed) {
            GraphStatus::Failed
        } else {
            GraphStatus::Succeeded
        }
    }

    /// Evaluate the initial Ready set.
    ///
    /// Calling this more than once is a no-op that returns an empty step.
    pub fn step_start(&mut self) -> SchedulerStep {
        if self.started {
            warn!(graph = %self.graph.template_name(), "scheduler already started; ignoring");
            return SchedulerStep::default();
        }
        self.started = true;

        info!(
            graph = %self.graph.template_name(),
            tasks = self.graph.len(),
            "starting graph execution"
        );

        let mut step = SchedulerStep::default();
        self.manager().advance(&mut step);
        self.after_transitions(&mut step);
        step
    }

    /// A dispatched task actually started running.
    pub fn step_started(&mut self, task: &str) -> SchedulerStep {
        self.manager().mark_started(task);
        SchedulerStep {
            graph_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }

    /// Record the outcome of a dispatched task and move the graph forward.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        match self.manager().complete(task, outcome) {
            Some(TaskState::Failed) => step.newly_failed.push(task.to_string()),
            Some(_) => {}
            None => {
                step.graph_finished = self.is_finished();
                return step;
            }
        }

        if !self.cancelling {
            self.manager().advance(&mut step);
        }
        self.after_transitions(&mut step);
        step
    }

    /// Stop the graph: skip everything not yet running and cancel what is.
    pub fn step_shutdown(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        self.interrupted = true;
        if !self.cancelling {
            info!(graph = %self.graph.template_name(), "shutdown requested; cancelling graph");
            self.cancelling = true;
            self.manager().cancel_remaining(&mut step);
        }
        step.graph_finished = self.is_finished();
        step
    }

    /// Apply the failure policies after a batch of transitions:
    ///
    /// - fail-fast: any failure cancels everything else;
    /// - once a task has Failed and nothing can be dispatched any more, the
    ///   graph is terminal-Failed and Running tasks are cancelled.
    fn after_transitions(&mut self, step: &mut SchedulerStep) {
        if !self.cancelling {
            let fail_fast = self.graph.fail_fast();
            let manager = self.manager();

            let trigger = if fail_fast && manager.any_failed() {
                Some("fail-fast")
            } else if manager.any_failed()
                && !manager.any_schedulable()
                && !manager.running().is_empty()
            {
                Some("graph cannot succeed any more")
            } else {
                None
            };

            if let Some(why) = trigger {
                warn!(
                    graph = %self.graph.template_name(),
                    reason = why,
                    "cancelling remaining tasks"
                );
                self.cancelling = true;
                self.manager().cancel_remaining(step);
            }
        }

        step.graph_finished = self.is_finished();
        if step.graph_finished {
            debug!(
                graph = %self.graph.template_name(),
                status = ?self.status(),
                "all tasks terminal"
            );
        }
    }

    fn manager(&mut self) -> StateManager<'_> {
        StateManager::new(&self.graph, &self.workflow, &mut self.tasks, &mut self.seq)
    }
}
