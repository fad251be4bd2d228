// tests/scheduler_steps.rs
//
// Step-by-step scheduler behaviour, without any runtime.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use dagweave::dag::{DagBuilder, GraphStatus, Scheduler, TaskState};
use dagweave::engine::{CoreCommand, CoreRuntime, FailureReason, RuntimeEvent, TaskOutcome, TaskOutputs};
use dagweave::errors::DagweaveError;
use dagweave::expr::WorkflowContext;
use dagweave::manifest::Manifest;
use dagweave::output::aggregate;
use dagweave::template::Template;
use dagweave_test_utils::{ManifestBuilder, TaskBuilder, TemplateBuilder};

use crate::common::{args, init_tracing};

fn echo() -> TemplateBuilder {
    TemplateBuilder::script("echo", "echo {{inputs.parameters.message}}")
        .input("message")
        .output_expr("X", "{{inputs.parameters.message}}")
}

fn scheduler_for(manifest: &Manifest, template: &str) -> Scheduler {
    let wf = Arc::new(WorkflowContext::new("wf", BTreeMap::new()));
    let graph = DagBuilder::new(&manifest.registry, &wf)
        .build_named(template, &BTreeMap::new())
        .unwrap();
    Scheduler::new(graph, wf)
}

fn ok(result: &str, outputs: &[(&str, &str)]) -> TaskOutcome {
    TaskOutcome::Succeeded(TaskOutputs {
        result: Some(result.to_string()),
        parameters: args(outputs),
        captured: BTreeMap::new(),
    })
}

fn failed(message: &str) -> TaskOutcome {
    TaskOutcome::Failed(FailureReason::Runner {
        message: message.to_string(),
        exit_code: Some(1),
    })
}

fn names(tasks: &[dagweave::dag::ScheduledTask]) -> Vec<&str> {
    let mut out: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
    out.sort();
    out
}

#[test]
fn chain_runs_in_order_and_propagates_outputs() {
    init_tracing();

    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("task1", "echo").arg("message", "foo"))
                .task(
                    TaskBuilder::new("task2", "echo")
                        .arg("message", "{{tasks.task1.outputs.parameters.X}}"),
                ),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    let step = s.step_start();
    assert_eq!(names(&step.newly_scheduled), vec!["task1"]);
    assert_eq!(s.state_of("task1"), Some(TaskState::Ready));
    assert_eq!(s.state_of("task2"), Some(TaskState::Pending));

    s.step_started("task1");
    assert_eq!(s.state_of("task1"), Some(TaskState::Running));

    let step = s.step_completion("task1", ok("foo", &[("X", "foo")]));
    assert_eq!(step.newly_scheduled.len(), 1);
    assert_eq!(step.newly_scheduled[0].name, "task2");
    assert_eq!(step.newly_scheduled[0].arguments.get("message").unwrap(), "foo");
    assert!(!step.graph_finished);

    s.step_started("task2");
    let step = s.step_completion("task2", ok("foo", &[("X", "foo")]));
    assert!(step.graph_finished);
    assert_eq!(s.status(), GraphStatus::Succeeded);
}

#[test]
fn adjacent_output_references_concatenate() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("left", "echo").arg("message", "ab"))
                .task(TaskBuilder::new("right", "echo").arg("message", "cd"))
                .task(TaskBuilder::new("join", "echo").arg(
                    "message",
                    "{{tasks.left.outputs.parameters.X}}{{tasks.right.outputs.parameters.X}}",
                )),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    let step = s.step_start();
    assert_eq!(names(&step.newly_scheduled), vec!["left", "right"]);

    let step = s.step_completion("left", ok("ab", &[("X", "ab")]));
    assert!(step.newly_scheduled.is_empty());
    let step = s.step_completion("right", ok("cd", &[("X", "cd")]));
    assert_eq!(step.newly_scheduled[0].arguments.get("message").unwrap(), "abcd");
}

fn diamond(depends_d: &str) -> Manifest {
    ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(TaskBuilder::new("B", "echo").arg("message", "b").depends("A"))
                .task(TaskBuilder::new("C", "echo").arg("message", "c").depends("A"))
                .task(TaskBuilder::new("D", "echo").arg("message", "d").depends(depends_d)),
        )
        .build()
}

#[test]
fn and_waits_for_both_branches() {
    let manifest = diamond("B && C");
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    let step = s.step_completion("A", ok("a", &[]));
    assert_eq!(names(&step.newly_scheduled), vec!["B", "C"]);

    let step = s.step_completion("B", ok("b", &[]));
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(s.state_of("D"), Some(TaskState::Pending));

    let step = s.step_completion("C", ok("c", &[]));
    assert_eq!(names(&step.newly_scheduled), vec!["D"]);
}

#[test]
fn or_runs_after_either_branch() {
    let manifest = diamond("B || C");
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_completion("A", ok("a", &[]));
    let step = s.step_completion("C", ok("c", &[]));
    assert_eq!(names(&step.newly_scheduled), vec!["D"]);
}

#[test]
fn or_survives_one_failed_branch() {
    let manifest = diamond("B || C");
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_completion("A", ok("a", &[]));
    let step = s.step_completion("B", failed("boom"));
    assert_eq!(step.newly_failed, vec!["B".to_string()]);
    assert!(step.newly_skipped.is_empty());
    assert_eq!(s.state_of("D"), Some(TaskState::Pending));

    let step = s.step_completion("C", ok("c", &[]));
    assert_eq!(names(&step.newly_scheduled), vec!["D"]);

    s.step_completion("D", ok("d", &[]));
    assert!(s.is_finished());
    // A failure stays visible even though the graph routed around it.
    assert_eq!(s.status(), GraphStatus::Failed);
}

#[test]
fn failure_skips_the_downstream_closure() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(TaskBuilder::new("B", "echo").arg("message", "b").depends("A"))
                .task(TaskBuilder::new("C", "echo").arg("message", "c").depends("B"))
                .task(TaskBuilder::new("side", "echo").arg("message", "s")),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    let step = s.step_start();
    assert_eq!(names(&step.newly_scheduled), vec!["A", "side"]);

    let step = s.step_completion("A", failed("boom"));
    let mut skipped = step.newly_skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["B".to_string(), "C".to_string()]);
    assert_eq!(s.status(), GraphStatus::Running);

    // The unrelated branch keeps running and finishes normally.
    let step = s.step_completion("side", ok("s", &[]));
    assert!(step.graph_finished);
    assert_eq!(s.state_of("side"), Some(TaskState::Succeeded));
    assert_eq!(s.status(), GraphStatus::Failed);
}

#[test]
fn failure_handler_runs_only_on_failure() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(TaskBuilder::new("onfail", "echo").arg("message", "f").depends("A.Failed"))
                .task(TaskBuilder::new("always", "echo").arg("message", "x").depends("A.Completed"))
                .task(TaskBuilder::new("unless", "echo").arg("message", "u").depends("!A")),
        )
        .build();

    let mut happy = scheduler_for(&manifest, "main");
    happy.step_start();
    let step = happy.step_completion("A", ok("a", &[]));
    assert_eq!(names(&step.newly_scheduled), vec!["always"]);
    let mut skipped = step.newly_skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["onfail".to_string(), "unless".to_string()]);

    let mut sad = scheduler_for(&manifest, "main");
    sad.step_start();
    let step = sad.step_completion("A", failed("boom"));
    assert_eq!(names(&step.newly_scheduled), vec!["always", "onfail", "unless"]);
}

#[test]
fn implicit_producer_failure_skips_consumer() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(TaskBuilder::new("B", "echo").arg("message", "b"))
                // `A.Failed` alone would be satisfied, but the reference to B's
                // output needs B to have Succeeded.
                .task(
                    TaskBuilder::new("C", "echo")
                        .arg("message", "{{tasks.B.outputs.parameters.X}}")
                        .depends("A.Failed"),
                ),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_completion("A", failed("boom"));
    assert_eq!(s.state_of("C"), Some(TaskState::Pending));

    let step = s.step_completion("B", failed("also boom"));
    assert_eq!(step.newly_skipped, vec!["C".to_string()]);
}

#[test]
fn missing_output_value_fails_the_consumer_at_ready_time() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(
                    TaskBuilder::new("B", "echo")
                        .arg("message", "{{tasks.A.outputs.parameters.X}}"),
                ),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    // The runner "forgot" X.
    let step = s.step_completion("A", ok("a", &[]));
    assert_eq!(step.newly_failed, vec!["B".to_string()]);

    let b = s.instance("B").unwrap();
    assert!(matches!(b.failure, Some(FailureReason::Resolution(_))));
    assert!(s.is_finished());
}

#[test]
fn fail_fast_skips_pending_and_cancels_running() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .fail_fast(true)
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(TaskBuilder::new("B", "echo").arg("message", "b"))
                .task(TaskBuilder::new("C", "echo").arg("message", "c").depends("B")),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_started("A");
    s.step_started("B");

    let step = s.step_completion("A", failed("boom"));
    assert_eq!(step.to_cancel, vec!["B".to_string()]);
    assert!(step.newly_skipped.contains(&"C".to_string()));
    assert!(!step.graph_finished);

    // The cancelled task reports back; the graph is then done.
    let step = s.step_completion("B", TaskOutcome::Failed(FailureReason::Cancelled));
    assert!(step.graph_finished);
    assert_eq!(s.status(), GraphStatus::Failed);
}

#[test]
fn running_tasks_are_cancelled_once_the_graph_cannot_succeed() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                .task(TaskBuilder::new("slow", "echo").arg("message", "s")),
        )
        .build();
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_started("A");
    s.step_started("slow");

    let step = s.step_completion("A", failed("boom"));
    assert_eq!(step.to_cancel, vec!["slow".to_string()]);
}

#[test]
fn shutdown_skips_everything_not_running() {
    let manifest = diamond("B && C");
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_started("A");

    let step = s.step_shutdown();
    assert_eq!(step.to_cancel, vec!["A".to_string()]);
    let mut skipped = step.newly_skipped.clone();
    skipped.sort();
    assert_eq!(skipped, vec!["B".to_string(), "C".to_string(), "D".to_string()]);

    let step = s.step_completion("A", TaskOutcome::Failed(FailureReason::Cancelled));
    assert!(step.graph_finished);
    assert!(s.was_interrupted());
    assert_eq!(s.status(), GraphStatus::Failed);
}

#[test]
fn late_completions_of_terminal_tasks_are_ignored() {
    let manifest = diamond("B && C");
    let mut s = scheduler_for(&manifest, "main");

    s.step_start();
    s.step_completion("A", ok("a", &[]));
    let step = s.step_completion("A", failed("duplicate"));
    assert!(step.is_empty());
    assert_eq!(s.state_of("A"), Some(TaskState::Succeeded));

    let step = s.step_completion("nope", ok("x", &[]));
    assert!(step.is_empty());
}

#[test]
fn core_runtime_turns_steps_into_commands() {
    let manifest = diamond("B && C");
    let mut core = CoreRuntime::new(scheduler_for(&manifest, "main"));

    let step = core.start();
    assert!(step.keep_running);
    match step.commands.as_slice() {
        [CoreCommand::DispatchTasks(tasks)] => assert_eq!(names(tasks), vec!["A"]),
        other => panic!("expected a single dispatch, got {other:?}"),
    }

    let step = core.step(RuntimeEvent::TaskStarted {
        task: "A".to_string(),
    });
    assert!(step.commands.is_empty());
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::ShutdownRequested);
    assert!(step
        .commands
        .iter()
        .any(|c| matches!(c, CoreCommand::CancelTasks(t) if t == &vec!["A".to_string()])));
    assert!(step.keep_running);

    let step = core.step(RuntimeEvent::TaskCompleted {
        task: "A".to_string(),
        outcome: TaskOutcome::Failed(FailureReason::Cancelled),
        child: None,
    });
    assert!(!step.keep_running);
    assert!(core.is_finished());
}

#[test]
fn output_aggregation_is_repeatable_and_latest_capture_wins() {
    let manifest = ManifestBuilder::new("main")
        .template(echo())
        .template(
            TemplateBuilder::dag("main")
                .output_expr(
                    "joined",
                    "{{tasks.left.outputs.parameters.X}}-{{tasks.right.outputs.result}}",
                )
                .output_path("file", "/out")
                .task(TaskBuilder::new("left", "echo").arg("message", "l"))
                .task(TaskBuilder::new("right", "echo").arg("message", "r")),
        )
        .build();
    let Template::Dag(dag) = manifest.registry.lookup("main").unwrap() else {
        panic!("main should be a DAG");
    };
    let mut s = scheduler_for(&manifest, "main");

    let captured = |value: &str| {
        TaskOutcome::Succeeded(TaskOutputs {
            result: Some(value.to_string()),
            parameters: args(&[("X", value)]),
            captured: args(&[("/out", value)]),
        })
    };

    s.step_start();
    match aggregate(dag, &s) {
        Err(DagweaveError::UnresolvedOutput { output, .. }) => assert_eq!(output, "joined"),
        other => panic!("expected UnresolvedOutput, got {other:?}"),
    }

    s.step_completion("left", captured("L"));
    s.step_completion("right", captured("R"));

    let first = aggregate(dag, &s).unwrap();
    assert_eq!(first, args(&[("joined", "L-R"), ("file", "R")]));
    assert_eq!(aggregate(dag, &s).unwrap(), first);
}
