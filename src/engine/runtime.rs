// src/engine/runtime.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::dag::{DagBuilder, DagGraph, GraphStatus, ScheduledTask, Scheduler};
use crate::engine::core::CoreRuntime;
use crate::engine::report::{RunPhase, TaskSnapshot, TemplateRun};
use crate::engine::{
    CoreCommand, FailureReason, RuntimeEvent, RuntimeOptions, TaskName, TaskOutcome, TaskOutputs,
};
use crate::errors::Result;
use crate::exec::{RunRequest, TaskRunner};
use crate::expr::WorkflowContext;
use crate::output::{aggregate, captured_values, script_outputs};
use crate::template::{
    DagTemplate, OutputSource, ScriptTemplate, Template, TemplateRegistry, bind_inputs,
};

pub type RunTemplateFuture = Pin<Box<dyn Future<Output = Result<TemplateRun>> + Send + 'static>>;

/// Executes templates: runs the event loop of each graph around its
/// `CoreRuntime`, hands script tasks to the `TaskRunner` and runs DAG tasks
/// as nested graphs.
///
/// Cheap to clone; clones share the registry, the runner, the parallelism
/// slots and the shutdown signal. Every graph, at every nesting level, owns
/// its own scheduler and is the only writer of its task states.
#[derive(Clone)]
pub struct Runtime {
    registry: Arc<TemplateRegistry>,
    workflow: Arc<WorkflowContext>,
    runner: Arc<dyn TaskRunner>,
    options: RuntimeOptions,
    /// Shared across nesting levels. Only script tasks take a slot.
    slots: Option<Arc<Semaphore>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("workflow", &self.workflow.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Requests a graceful stop of every graph of a [`Runtime`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_requested(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Runtime {
    pub fn new(
        registry: Arc<TemplateRegistry>,
        workflow: Arc<WorkflowContext>,
        runner: Arc<dyn TaskRunner>,
        options: RuntimeOptions,
    ) -> Self {
        let slots = options
            .parallelism
            .map(|n| Arc::new(Semaphore::new(n.max(1))));
        let (shutdown, _) = watch::channel(false);

        Self {
            registry,
            workflow,
            runner,
            options,
            slots,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown.clone(),
        }
    }

    fn builder(&self) -> DagBuilder<'_> {
        DagBuilder::new(&self.registry, &self.workflow).with_fail_fast_default(self.options.fail_fast)
    }

    /// Run the template `name` with `args` to completion.
    ///
    /// Structural errors (unknown template, bad arguments, invalid graph)
    /// are returned as `Err` before anything runs. Task failures are part
    /// of the returned [`TemplateRun`].
    pub fn run_template(&self, name: &str, args: BTreeMap<String, String>) -> RunTemplateFuture {
        let this = self.clone();
        let name = name.to_string();
        Box::pin(async move { this.run_template_inner(name, args).await })
    }

    async fn run_template_inner(
        self,
        name: String,
        args: BTreeMap<String, String>,
    ) -> Result<TemplateRun> {
        let template = self.registry.lookup(&name)?.clone();

        match template {
            Template::Dag(dag) => {
                let graph = self.builder().build(&dag, &args)?;
                Ok(self.run_graph(&dag, graph).await)
            }
            Template::Script(script) => {
                let inputs = bind_inputs(&script.name, &script.inputs, &args, &self.workflow)?;
                let outcome = self.run_script(&name, &script, &inputs, None).await;
                Ok(script_report(&script, inputs, outcome))
            }
        }
    }

    /// Main event loop of one graph.
    ///
    /// - Seeds the graph with its initially Ready tasks.
    /// - Consumes `RuntimeEvent`s from the graph's task jobs and the shutdown
    ///   signal, feeds them into the core and executes the commands it
    ///   returns.
    /// - Stops once every task is terminal, then aggregates outputs.
    pub async fn run_graph(&self, dag: &DagTemplate, graph: DagGraph) -> TemplateRun {
        let inputs = graph.inputs().clone();
        let mut core = CoreRuntime::new(Scheduler::new(graph, self.workflow.clone()));

        let (event_tx, mut event_rx) = mpsc::channel::<RuntimeEvent>(64);
        let mut jobs = JoinSet::new();
        let mut cancels: HashMap<TaskName, oneshot::Sender<()>> = HashMap::new();
        let mut children: HashMap<TaskName, TemplateRun> = HashMap::new();

        let mut shutdown = self.shutdown.subscribe();
        let mut watching_shutdown = true;

        let mut step = if *shutdown.borrow_and_update() {
            watching_shutdown = false;
            core.step(RuntimeEvent::ShutdownRequested)
        } else {
            core.start()
        };

        loop {
            let commands = std::mem::take(&mut step.commands);
            self.execute_commands(commands, &mut jobs, &mut cancels, &event_tx);

            if !step.keep_running {
                break;
            }

            let event = tokio::select! {
                Some(event) = event_rx.recv() => event,
                changed = shutdown.changed(), if watching_shutdown => {
                    match changed {
                        Ok(()) if *shutdown.borrow_and_update() => {
                            watching_shutdown = false;
                            RuntimeEvent::ShutdownRequested
                        }
                        Ok(()) => continue,
                        Err(_) => {
                            watching_shutdown = false;
                            continue;
                        }
                    }
                }
                else => {
                    warn!(graph = %dag.name, "graph event channel closed; stopping");
                    break;
                }
            };

            let event = match event {
                RuntimeEvent::TaskCompleted {
                    task,
                    outcome,
                    child,
                } => {
                    debug!(graph = %dag.name, task = %task, "task completed");
                    if let Some(child) = child {
                        children.insert(task.clone(), *child);
                    }
                    RuntimeEvent::TaskCompleted {
                        task,
                        outcome,
                        child: None,
                    }
                }
                other => other,
            };

            step = core.step(event);
        }

        // Stragglers: dispatched tasks that were skipped before starting.
        drop(cancels);
        jobs.shutdown().await;

        graph_report(dag, inputs, core.into_scheduler(), children)
    }

    fn execute_commands(
        &self,
        commands: Vec<CoreCommand>,
        jobs: &mut JoinSet<()>,
        cancels: &mut HashMap<TaskName, oneshot::Sender<()>>,
        events: &mpsc::Sender<RuntimeEvent>,
    ) {
        for command in commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => {
                    for task in tasks {
                        let (cancel_tx, cancel_rx) = oneshot::channel();
                        cancels.insert(task.name.clone(), cancel_tx);
                        debug!(task = %task.name, template = %task.template, "dispatching task");
                        jobs.spawn(self.clone().run_task(task, events.clone(), cancel_rx));
                    }
                }
                CoreCommand::CancelTasks(names) => {
                    for name in names {
                        if let Some(cancel) = cancels.remove(&name) {
                            if cancel.send(()).is_err() {
                                debug!(task = %name, "task already finished while cancelling");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Job of one dispatched task: run it unless cancelled first, then
    /// report the outcome to the graph loop.
    async fn run_task(
        self,
        task: ScheduledTask,
        events: mpsc::Sender<RuntimeEvent>,
        mut cancel: oneshot::Receiver<()>,
    ) {
        let name = task.name.clone();

        let (outcome, child) = tokio::select! {
            done = self.execute_task(task, &events) => done,
            _ = &mut cancel => {
                info!(task = %name, "cancellation requested; stopping task");
                (TaskOutcome::Failed(FailureReason::Cancelled), None)
            }
        };

        let event = RuntimeEvent::TaskCompleted {
            task: name.clone(),
            outcome,
            child: child.map(Box::new),
        };
        if events.send(event).await.is_err() {
            debug!(task = %name, "graph loop finished; dropping completion");
        }
    }

    async fn execute_task(
        &self,
        task: ScheduledTask,
        events: &mpsc::Sender<RuntimeEvent>,
    ) -> (TaskOutcome, Option<TemplateRun>) {
        let template = match self.registry.lookup(&task.template) {
            Ok(t) => t.clone(),
            Err(e) => {
                return (
                    TaskOutcome::Failed(FailureReason::Resolution(e.to_string())),
                    None,
                );
            }
        };

        match template {
            Template::Script(script) => {
                let inputs =
                    match bind_inputs(&script.name, &script.inputs, &task.arguments, &self.workflow) {
                        Ok(inputs) => inputs,
                        Err(e) => {
                            return (
                                TaskOutcome::Failed(FailureReason::Resolution(e.to_string())),
                                None,
                            );
                        }
                    };
                let outcome = self
                    .run_script(&task.name, &script, &inputs, Some(events))
                    .await;
                (outcome, None)
            }
            Template::Dag(dag) => {
                notify_started(Some(events), &task.name).await;
                debug!(task = %task.name, template = %dag.name, "running sub-graph");

                match self.run_template(&dag.name, task.arguments.clone()).await {
                    Err(e) => (
                        TaskOutcome::Failed(FailureReason::Subgraph {
                            template: dag.name.clone(),
                            message: e.to_string(),
                        }),
                        None,
                    ),
                    Ok(run) => {
                        let outcome = if run.succeeded() {
                            TaskOutcome::Succeeded(TaskOutputs {
                                result: None,
                                parameters: run.outputs.clone(),
                                captured: run.captured.clone(),
                            })
                        } else {
                            TaskOutcome::Failed(FailureReason::Subgraph {
                                template: dag.name.clone(),
                                message: run.failure.clone().unwrap_or_default(),
                            })
                        };
                        (outcome, Some(run))
                    }
                }
            }
        }
    }

    /// Run one script task through the runner: wait for a slot, apply the
    /// timeout, and derive the declared outputs.
    async fn run_script(
        &self,
        task: &str,
        script: &ScriptTemplate,
        inputs: &BTreeMap<String, String>,
        events: Option<&mpsc::Sender<RuntimeEvent>>,
    ) -> TaskOutcome {
        let _permit = match &self.slots {
            Some(slots) => match slots.clone().acquire_owned().await {
                Ok(permit) => Some(permit),
                Err(_) => return TaskOutcome::Failed(FailureReason::Cancelled),
            },
            None => None,
        };

        notify_started(events, task).await;

        let request = RunRequest {
            task: task.to_string(),
            template: script.name.clone(),
            inputs: inputs.clone(),
            script: script.script.clone(),
            capture_paths: script
                .outputs
                .iter()
                .filter_map(|o| match &o.source {
                    OutputSource::Path(path) => Some(path.clone()),
                    OutputSource::Expression(_) => None,
                })
                .collect(),
            workflow: self.workflow.clone(),
        };

        let run = self.runner.run(request);
        let result = match script.timeout.or(self.options.task_timeout) {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(task = %task, ?limit, "task timed out");
                    return TaskOutcome::Failed(FailureReason::Timeout(limit));
                }
            },
            None => run.await,
        };

        match result {
            Err(failure) => TaskOutcome::Failed(FailureReason::Runner {
                message: failure.message,
                exit_code: failure.exit_code,
            }),
            Ok(output) => match script_outputs(script, inputs, &self.workflow, &output) {
                Ok(parameters) => TaskOutcome::Succeeded(TaskOutputs {
                    result: Some(output.result),
                    parameters,
                    captured: output.captured,
                }),
                Err(reason) => TaskOutcome::Failed(reason),
            },
        }
    }
}

async fn notify_started(events: Option<&mpsc::Sender<RuntimeEvent>>, task: &str) {
    if let Some(events) = events {
        let started = RuntimeEvent::TaskStarted {
            task: task.to_string(),
        };
        if events.send(started).await.is_err() {
            debug!(task = %task, "graph loop finished before task started");
        }
    }
}

fn graph_report(
    dag: &DagTemplate,
    inputs: BTreeMap<String, String>,
    scheduler: Scheduler,
    mut children: HashMap<TaskName, TemplateRun>,
) -> TemplateRun {
    let tasks: Vec<TaskSnapshot> = scheduler
        .instances()
        .map(|t| TaskSnapshot {
            name: t.name.clone(),
            template: t.template.clone(),
            state: t.state,
            arguments: t.arguments.clone(),
            result: t.outputs.as_ref().and_then(|o| o.result.clone()),
            outputs: t
                .outputs
                .as_ref()
                .map(|o| o.parameters.clone())
                .unwrap_or_default(),
            failure: t.failure.clone(),
            child: children.remove(&t.name).map(Box::new),
        })
        .collect();

    let captured = captured_values(&scheduler);

    let (phase, outputs, failure) = match scheduler.status() {
        GraphStatus::Succeeded => match aggregate(dag, &scheduler) {
            Ok(outputs) => (RunPhase::Succeeded, outputs, None),
            Err(e) => {
                warn!(graph = %dag.name, error = %e, "output aggregation failed");
                (RunPhase::Failed, BTreeMap::new(), Some(e.to_string()))
            }
        },
        GraphStatus::Failed | GraphStatus::Running => (
            RunPhase::Failed,
            BTreeMap::new(),
            Some(describe_failures(&tasks, scheduler.was_interrupted())),
        ),
    };

    info!(graph = %dag.name, phase = %phase, "graph finished");

    TemplateRun {
        template: dag.name.clone(),
        phase,
        inputs,
        outputs,
        result: None,
        captured,
        tasks,
        failure,
    }
}

fn describe_failures(tasks: &[TaskSnapshot], interrupted: bool) -> String {
    let mut parts: Vec<String> = tasks
        .iter()
        .filter_map(|t| {
            t.failure
                .as_ref()
                .map(|reason| format!("task '{}' failed: {}", t.name, reason))
        })
        .collect();

    if interrupted {
        parts.push("interrupted by shutdown".to_string());
    }
    if parts.is_empty() {
        parts.push("graph did not finish".to_string());
    }
    parts.join("; ")
}

fn script_report(
    script: &ScriptTemplate,
    inputs: BTreeMap<String, String>,
    outcome: TaskOutcome,
) -> TemplateRun {
    let (phase, outputs, result, captured, failure) = match outcome {
        TaskOutcome::Succeeded(out) => (
            RunPhase::Succeeded,
            out.parameters,
            out.result,
            out.captured,
            None,
        ),
        TaskOutcome::Failed(reason) => (
            RunPhase::Failed,
            BTreeMap::new(),
            None,
            BTreeMap::new(),
            Some(reason.to_string()),
        ),
    };

    TemplateRun {
        template: script.name.clone(),
        phase,
        inputs,
        outputs,
        result,
        captured,
        tasks: Vec::new(),
        failure,
    }
}
