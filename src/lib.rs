// src/lib.rs

pub mod cli;
pub mod dag;
pub mod depends;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod expr;
pub mod fs;
pub mod logging;
pub mod manifest;
pub mod output;
pub mod template;
pub mod types;
pub mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::engine::{TaskSnapshot, TemplateRun};
use crate::exec::ShellRunner;
use crate::manifest::{Manifest, load_and_validate};
use crate::workflow::Workflow;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - manifest loading and CLI overrides
/// - workflow validation
/// - the runtime with the process-backed runner
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let manifest_path = PathBuf::from(&args.manifest);
    let mut manifest = load_and_validate(&manifest_path)
        .with_context(|| format!("loading manifest {}", manifest_path.display()))?;
    apply_overrides(&mut manifest, &args);

    let workflow = Workflow::from_manifest(manifest)?;

    if args.dry_run {
        print_dry_run(&workflow)?;
        return Ok(());
    }

    let runner = ShellRunner::new().working_dir(manifest_root_dir(&manifest_path));
    let runtime = workflow.runtime(Arc::new(runner));

    // Ctrl-C → graceful shutdown.
    {
        let shutdown = runtime.shutdown_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl+C received, cancelling running tasks");
            shutdown.request();
        });
    }

    let report = workflow.run_with(&runtime).await?;
    print_report(&report);

    if !report.succeeded() {
        bail!(
            "workflow '{}' failed: {}",
            workflow.name(),
            report.failure.as_deref().unwrap_or("one or more tasks failed")
        );
    }

    info!(workflow = %workflow.name(), "workflow succeeded");
    Ok(())
}

fn apply_overrides(manifest: &mut Manifest, args: &CliArgs) {
    if let Some(entry) = &args.entrypoint {
        manifest.workflow.entrypoint = entry.clone();
    }
    for (key, value) in &args.params {
        manifest
            .workflow
            .arguments
            .insert(key.clone(), value.clone());
    }
    if args.parallelism.is_some() {
        manifest.config.parallelism = args.parallelism;
    }
    if args.fail_fast {
        manifest.config.fail_fast = true;
    }
}

/// Relative capture paths and processes run next to the manifest.
fn manifest_root_dir(manifest_path: &std::path::Path) -> PathBuf {
    match manifest_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Dry-run output: templates, each DAG's tasks in topological order, and
/// its edges.
fn print_dry_run(workflow: &Workflow) -> Result<()> {
    println!("dagweave dry-run");
    println!("  workflow = {}", workflow.name());
    println!("  entrypoint = {}", workflow.entrypoint());
    let options = workflow.options();
    match options.parallelism {
        Some(n) => println!("  config.parallelism = {n}"),
        None => println!("  config.parallelism = unbounded"),
    }
    if let Some(t) = options.task_timeout {
        println!("  config.task_timeout = {t:?}");
    }
    println!("  config.fail_fast = {}", options.fail_fast);
    println!();

    println!("templates ({}):", workflow.registry().len());
    for template in workflow.registry().iter() {
        println!("  - {} ({})", template.name(), template.kind());
    }

    for graph in workflow.graphs()? {
        println!();
        println!("dag {} ({} tasks):", graph.template_name(), graph.len());
        for node in graph.nodes() {
            println!("  - {} -> {}", node.name, node.template);
            if let Some(depends) = &node.depends {
                println!("      depends: {depends}");
            }
            for (name, expr) in &node.arguments {
                println!("      arg {name} = {expr}");
            }
            let deps = graph.dependencies_of(&node.name);
            if !deps.is_empty() {
                println!("      after: {deps:?}");
            }
        }
        let edges = graph.edges();
        if !edges.is_empty() {
            println!("  edges:");
            for (from, to) in edges {
                println!("    {from} -> {to}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_report(report: &TemplateRun) {
    println!("{} {}", report.template, report.phase);
    print_tasks(&report.tasks, 1);

    if let Some(result) = &report.result {
        println!("result: {result}");
    }
    if !report.outputs.is_empty() {
        println!("outputs:");
        for (name, value) in &report.outputs {
            println!("  {name} = {value}");
        }
    }
}

fn print_tasks(tasks: &[TaskSnapshot], depth: usize) {
    let indent = "  ".repeat(depth);
    for task in tasks {
        match &task.failure {
            Some(reason) => println!("{indent}{} [{:?}] {reason}", task.name, task.state),
            None => println!("{indent}{} [{:?}]", task.name, task.state),
        }
        if let Some(child) = &task.child {
            print_tasks(&child.tasks, depth + 1);
        }
    }
}
