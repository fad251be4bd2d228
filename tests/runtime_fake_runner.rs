// tests/runtime_fake_runner.rs

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use dagweave::dag::TaskState;
use dagweave::engine::{FailureReason, RunPhase};
use dagweave::errors::DagweaveError;
use dagweave::exec::{RunnerFailure, RunnerOutput};
use dagweave_test_utils::{FakeRunner, ManifestBuilder, TaskBuilder, TemplateBuilder};

use crate::common::{args, init_tracing, with_timeout};

fn echo() -> TemplateBuilder {
    TemplateBuilder::script("echo", "echo {{inputs.parameters.message}}")
        .input("message")
        .output_expr("X", "{{inputs.parameters.message}}")
}

fn echo_runner() -> FakeRunner {
    FakeRunner::new().echo("echo", "message")
}

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} was never dispatched"))
}

#[tokio::test]
async fn runs_simple_chain() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(
                TemplateBuilder::dag("main")
                    .output_expr("final", "{{tasks.B.outputs.result}}")
                    .task(TaskBuilder::new("A", "echo").arg("message", "foo"))
                    .task(
                        TaskBuilder::new("B", "echo")
                            .arg("message", "{{tasks.A.outputs.parameters.X}}"),
                    ),
            )
            .workflow();

        let runner = echo_runner();
        let report = workflow.run(runner.clone().into_runner()).await.unwrap();

        assert_eq!(report.phase, RunPhase::Succeeded);
        assert_eq!(runner.dispatched(), vec!["A".to_string(), "B".to_string()]);

        let b = report.task("B").unwrap();
        assert_eq!(b.arguments.as_ref().unwrap().get("message").unwrap(), "foo");
        assert_eq!(b.result.as_deref(), Some("foo"));
        assert_eq!(report.outputs, args(&[("final", "foo")]));
    })
    .await;
}

#[tokio::test]
async fn diamond_respects_dependencies() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                    .task(TaskBuilder::new("B", "echo").arg("message", "b").depends("A"))
                    .task(TaskBuilder::new("C", "echo").arg("message", "c").depends("A"))
                    .task(
                        TaskBuilder::new("D", "echo")
                            .arg(
                                "message",
                                "{{tasks.B.outputs.result}}{{tasks.C.outputs.result}}",
                            )
                            .depends("B && C"),
                    ),
            )
            .workflow();

        let runner = echo_runner().delay("echo", Duration::from_millis(5));
        let report = workflow.run(runner.clone().into_runner()).await.unwrap();

        assert!(report.succeeded());
        let order = runner.dispatched();
        let finished = runner.finished();
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], "A");
        assert_eq!(order[3], "D");
        // D never starts before both of its predecessors have finished.
        assert!(position(&finished, "B") < position(&finished, "D"));
        assert!(position(&finished, "C") < position(&finished, "D"));
        assert_eq!(report.task("D").unwrap().result.as_deref(), Some("bc"));
    })
    .await;
}

#[tokio::test]
async fn or_dependency_tolerates_a_failed_branch() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(TemplateBuilder::script("broken", "exit 1"))
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("B", "broken"))
                    .task(TaskBuilder::new("C", "echo").arg("message", "c"))
                    .task(TaskBuilder::new("D", "echo").arg("message", "d").depends("B || C"))
                    .task(TaskBuilder::new("E", "echo").arg("message", "e").depends("B")),
            )
            .workflow();

        // B fails while C is still running, so D becomes Ready afterwards.
        let runner = echo_runner()
            .delay("echo", Duration::from_millis(30))
            .fail("broken", "exit status 1");
        let report = workflow.run(runner.clone().into_runner()).await.unwrap();

        assert_eq!(report.task("D").unwrap().state, TaskState::Succeeded);
        assert_eq!(report.task("E").unwrap().state, TaskState::Skipped);
        assert_eq!(runner.dispatch_count("E"), 0);

        let b = report.task("B").unwrap();
        assert_eq!(b.state, TaskState::Failed);
        assert!(matches!(
            &b.failure,
            Some(FailureReason::Runner { message, .. }) if message == "exit status 1"
        ));

        // Any failed task fails the run, even when routed around.
        assert_eq!(report.phase, RunPhase::Failed);
        assert!(report.failure.as_deref().unwrap().contains("task 'B' failed"));
        assert!(report.outputs.is_empty());
    })
    .await;
}

#[tokio::test]
async fn nested_dag_is_referentially_transparent() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .argument("value_a", "dag_a")
            .argument("value_b", "X")
            .template(echo())
            .template(
                TemplateBuilder::dag("pair")
                    .input("value_a")
                    .input("value_b")
                    .output_expr(
                        "joined",
                        "{{tasks.left.outputs.result}}-{{tasks.right.outputs.parameters.X}}",
                    )
                    .task(
                        TaskBuilder::new("left", "echo")
                            .arg("message", "{{inputs.parameters.value_a}}"),
                    )
                    .task(
                        TaskBuilder::new("right", "echo")
                            .arg("message", "{{inputs.parameters.value_b}}"),
                    ),
            )
            .template(
                TemplateBuilder::dag("main")
                    .input("value_a")
                    .input("value_b")
                    .output_expr("joined", "{{tasks.inner.outputs.parameters.joined}}")
                    .task(
                        TaskBuilder::new("inner", "pair")
                            .arg("value_a", "{{inputs.parameters.value_a}}")
                            .arg("value_b", "{{inputs.parameters.value_b}}"),
                    )
                    .task(
                        TaskBuilder::new("after", "echo")
                            .arg("message", "{{tasks.inner.outputs.parameters.joined}}!"),
                    ),
            )
            .workflow();

        let runtime = workflow.runtime(echo_runner().into_runner());

        let nested = workflow.run_with(&runtime).await.unwrap();
        let standalone = runtime
            .run_template("pair", args(&[("value_a", "dag_a"), ("value_b", "X")]))
            .await.unwrap();

        assert!(nested.succeeded());
        assert!(standalone.succeeded());
        assert_eq!(standalone.outputs, args(&[("joined", "dag_a-X")]));

        let inner = nested.task("inner").unwrap();
        assert_eq!(inner.outputs, standalone.outputs);
        assert_eq!(inner.result, None);
        assert_eq!(nested.outputs, standalone.outputs);

        let child = inner.child.as_ref().unwrap();
        assert_eq!(child.template, "pair");
        assert_eq!(
            nested.find("inner.left").unwrap().result.as_deref(),
            Some("dag_a")
        );
        assert_eq!(
            nested.task("after").unwrap().result.as_deref(),
            Some("dag_a-X!")
        );
    })
    .await;
}

#[tokio::test]
async fn nested_failure_propagates_to_the_parent_task() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(TemplateBuilder::script("broken", "exit 1"))
            .template(
                TemplateBuilder::dag("inner")
                    .task(TaskBuilder::new("x", "broken")),
            )
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("sub", "inner"))
                    .task(TaskBuilder::new("next", "echo").arg("message", "n").depends("sub")),
            )
            .workflow();

        let runner = echo_runner().fail("broken", "no good");
        let report = workflow.run(runner.into_runner()).await.unwrap();

        assert_eq!(report.phase, RunPhase::Failed);
        let sub = report.task("sub").unwrap();
        assert_eq!(sub.state, TaskState::Failed);
        assert!(matches!(
            &sub.failure,
            Some(FailureReason::Subgraph { template, .. }) if template == "inner"
        ));
        assert_eq!(report.find("sub.x").unwrap().state, TaskState::Failed);
        assert_eq!(report.task("next").unwrap().state, TaskState::Skipped);
    })
    .await;
}

#[tokio::test]
async fn default_json_literal_reaches_the_runner_verbatim() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(
                TemplateBuilder::script("configure", "cat")
                    .input_default("options", r#"{"reverse": false}"#),
            )
            .template(TemplateBuilder::dag("main").task(TaskBuilder::new("cfg", "configure")))
            .workflow();

        let runner = FakeRunner::new().echo("configure", "options");
        let report = workflow.run(runner.into_runner()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(
            report.task("cfg").unwrap().result.as_deref(),
            Some(r#"{"reverse": false}"#)
        );
    })
    .await;
}

#[tokio::test]
async fn script_entrypoint_binds_workflow_arguments() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("echo")
            .argument("message", "hello")
            .argument("unrelated", "ignored")
            .template(echo())
            .workflow();

        let report = workflow.run(echo_runner().into_runner()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(report.inputs, args(&[("message", "hello")]));
        assert_eq!(report.result.as_deref(), Some("hello"));
        assert_eq!(report.outputs, args(&[("X", "hello")]));
        assert!(report.tasks.is_empty());
    })
    .await;
}

#[tokio::test]
async fn timeout_fails_the_task_with_a_distinct_reason() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(TemplateBuilder::script("sleepy", "sleep 100").timeout(Duration::from_millis(50)))
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("slow", "sleepy"))
                    .task(TaskBuilder::new("after", "echo").arg("message", "x").depends("slow")),
            )
            .workflow();

        let runner = echo_runner().hang("sleepy");
        let report = workflow.run(runner.into_runner()).await.unwrap();

        let slow = report.task("slow").unwrap();
        assert_eq!(slow.state, TaskState::Failed);
        assert_eq!(
            slow.failure,
            Some(FailureReason::Timeout(Duration::from_millis(50)))
        );
        assert_eq!(slow.failure.as_ref().unwrap().code(), "timeout");
        assert_eq!(report.task("after").unwrap().state, TaskState::Skipped);
    })
    .await;
}

#[tokio::test]
async fn workflow_task_timeout_applies_when_template_has_none() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .task_timeout(Duration::from_millis(40))
            .template(TemplateBuilder::script("sleepy", "sleep 100"))
            .template(TemplateBuilder::dag("main").task(TaskBuilder::new("slow", "sleepy")))
            .workflow();

        let report = workflow
            .run(FakeRunner::new().hang("sleepy").into_runner())
            .await.unwrap();

        assert!(matches!(
            report.task("slow").unwrap().failure,
            Some(FailureReason::Timeout(_))
        ));
    })
    .await;
}

#[tokio::test]
async fn fail_fast_cancels_running_siblings() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .fail_fast(true)
            .template(echo())
            .template(TemplateBuilder::script("broken", "exit 1"))
            .template(TemplateBuilder::script("forever", "sleep 1000"))
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("bad", "broken"))
                    .task(TaskBuilder::new("long", "forever"))
                    .task(TaskBuilder::new("later", "echo").arg("message", "l").depends("long")),
            )
            .workflow();

        let runner = FakeRunner::new()
            .fail("broken", "boom")
            .delay("broken", Duration::from_millis(50))
            .hang("forever");
        let report = workflow.run(runner.clone().into_runner()).await.unwrap();

        assert_eq!(report.phase, RunPhase::Failed);
        let long = report.task("long").unwrap();
        assert_eq!(long.state, TaskState::Failed);
        assert_eq!(long.failure, Some(FailureReason::Cancelled));
        assert_eq!(report.task("later").unwrap().state, TaskState::Skipped);
        assert_eq!(runner.dispatch_count("later"), 0);
    })
    .await;
}

#[tokio::test]
async fn parallelism_limits_concurrent_script_tasks() {
    with_timeout(async {
        init_tracing();

        let mut main = TemplateBuilder::dag("main");
        for i in 0..6 {
            main = main.task(TaskBuilder::new(&format!("t{i}"), "echo").arg("message", "m"));
        }
        let workflow = ManifestBuilder::new("main")
            .parallelism(2)
            .template(echo())
            .template(main)
            .workflow();

        let runner = echo_runner().delay("echo", Duration::from_millis(20));
        let report = workflow.run(runner.clone().into_runner()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(runner.dispatched().len(), 6);
        assert!(runner.max_in_flight() <= 2, "saw {}", runner.max_in_flight());
    })
    .await;
}

#[tokio::test]
async fn independent_tasks_run_concurrently_without_a_limit() {
    with_timeout(async {
        init_tracing();

        let mut main = TemplateBuilder::dag("main");
        for i in 0..4 {
            main = main.task(TaskBuilder::new(&format!("t{i}"), "echo").arg("message", "m"));
        }
        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(main)
            .workflow();

        let runner = echo_runner().delay("echo", Duration::from_millis(50));
        workflow.run(runner.clone().into_runner()).await.unwrap();

        assert!(runner.max_in_flight() > 1);
    })
    .await;
}

#[tokio::test]
async fn path_outputs_come_from_the_runner_capture() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(
                TemplateBuilder::script("writer", "write")
                    .input("value")
                    .output_path("file", "/tmp/out.txt"),
            )
            .template(
                TemplateBuilder::dag("main")
                    .output_path("file", "/tmp/out.txt")
                    .output_expr("first", "{{tasks.one.outputs.parameters.file}}")
                    .task(TaskBuilder::new("one", "writer").arg("value", "1"))
                    .task(TaskBuilder::new("two", "writer").arg("value", "2").depends("one")),
            )
            .workflow();

        let runner = FakeRunner::new().respond("writer", |req| {
            let mut captured = BTreeMap::new();
            captured.insert("/tmp/out.txt".to_string(), req.inputs["value"].clone());
            Ok(RunnerOutput {
                result: String::new(),
                captured,
            })
        });
        let report = workflow.run(runner.into_runner()).await.unwrap();

        assert!(report.succeeded());
        // The most recent writer of a path wins.
        assert_eq!(report.outputs, args(&[("file", "2"), ("first", "1")]));
    })
    .await;
}

#[tokio::test]
async fn capture_miss_fails_the_task() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(TemplateBuilder::script("writer", "write").output_path("file", "/tmp/never"))
            .template(TemplateBuilder::dag("main").task(TaskBuilder::new("w", "writer")))
            .workflow();

        let report = workflow
            .run(FakeRunner::new().into_runner())
            .await.unwrap();

        let w = report.task("w").unwrap();
        assert_eq!(w.state, TaskState::Failed);
        assert!(matches!(
            &w.failure,
            Some(FailureReason::CaptureMissing { output, path }) if output == "file" && path == "/tmp/never"
        ));
    })
    .await;
}

#[tokio::test]
async fn unresolved_output_fails_an_otherwise_successful_run() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(
                TemplateBuilder::dag("main")
                    .output_expr("never", "{{tasks.skipped.outputs.result}}")
                    .task(TaskBuilder::new("A", "echo").arg("message", "a"))
                    .task(
                        TaskBuilder::new("skipped", "echo")
                            .arg("message", "s")
                            .depends("A.Failed"),
                    ),
            )
            .workflow();

        let report = workflow.run(echo_runner().into_runner()).await.unwrap();

        assert_eq!(report.task("skipped").unwrap().state, TaskState::Skipped);
        assert_eq!(report.phase, RunPhase::Failed);
        assert!(report.failure.as_deref().unwrap().contains("never"));
    })
    .await;
}

#[tokio::test]
async fn shutdown_cancels_and_fails_the_run() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(TemplateBuilder::script("forever", "sleep 1000"))
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("long", "forever"))
                    .task(TaskBuilder::new("later", "echo").arg("message", "l").depends("long")),
            )
            .workflow();

        let runtime = workflow.runtime(echo_runner().hang("forever").into_runner());
        let handle = runtime.shutdown_handle();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.request();
        });

        let report = workflow.run_with(&runtime).await.unwrap();

        assert_eq!(report.phase, RunPhase::Failed);
        assert_eq!(report.task("long").unwrap().failure, Some(FailureReason::Cancelled));
        assert_eq!(report.task("later").unwrap().state, TaskState::Skipped);
        assert!(report.failure.as_deref().unwrap().contains("interrupted"));
        assert!(runtime.shutdown_handle().is_requested());
    })
    .await;
}

#[tokio::test]
async fn runner_failure_with_exit_code_is_recorded() {
    with_timeout(async {
        init_tracing();

        let workflow = ManifestBuilder::new("main")
            .template(TemplateBuilder::script("broken", "exit 3"))
            .template(TemplateBuilder::dag("main").task(TaskBuilder::new("b", "broken")))
            .workflow();

        let runner = FakeRunner::new()
            .respond("broken", |_| Err(RunnerFailure::new("exit 3").with_exit_code(3)));
        let report = workflow.run(runner.into_runner()).await.unwrap();

        assert_eq!(
            report.task("b").unwrap().failure,
            Some(FailureReason::Runner {
                message: "exit 3".to_string(),
                exit_code: Some(3),
            })
        );
    })
    .await;
}

#[tokio::test]
async fn structural_errors_reject_before_any_dispatch() {
    with_timeout(async {
        init_tracing();

        let result = ManifestBuilder::new("main")
            .template(echo())
            .template(
                TemplateBuilder::dag("main")
                    .task(TaskBuilder::new("A", "echo").arg("message", "a").depends("B"))
                    .task(TaskBuilder::new("B", "echo").arg("message", "b").depends("A")),
            )
            .try_workflow();
        assert!(matches!(result, Err(DagweaveError::CyclicDependency(_))));

        // Building through a valid workflow's runtime still rejects bad
        // arguments up front.
        let workflow = ManifestBuilder::new("main")
            .template(echo())
            .template(TemplateBuilder::dag("main").task(TaskBuilder::new("A", "echo").arg("message", "a")))
            .workflow();
        let runner = echo_runner();
        let runtime = workflow.runtime(runner.clone().into_runner());

        let err = runtime.run_template("echo", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, DagweaveError::MissingArgument { .. }));
        let err = runtime.run_template("nope", BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, DagweaveError::UnknownTemplate(_)));
        assert!(runner.dispatched().is_empty());
    })
    .await;
}

#[tokio::test]
async fn recursive_templates_are_rejected() {
    with_timeout(async {
        init_tracing();

        let result = ManifestBuilder::new("a")
            .template(echo())
            .template(TemplateBuilder::dag("a").task(TaskBuilder::new("to-b", "b")))
            .template(TemplateBuilder::dag("b").task(TaskBuilder::new("to-a", "a")))
            .try_workflow();

        assert!(matches!(result, Err(DagweaveError::CyclicDependency(_))));
    })
    .await;
}
