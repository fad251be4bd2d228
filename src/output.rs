// src/output.rs

//! Output aggregation: mapping a template's declared outputs to values.

use std::collections::BTreeMap;

use crate::dag::{Scheduler, TaskState};
use crate::engine::FailureReason;
use crate::errors::{DagweaveError, Result};
use crate::exec::RunnerOutput;
use crate::expr::{InputScope, WorkflowContext, resolve};
use crate::template::{DagTemplate, OutputSource, ScriptTemplate};

/// Compute the outputs of a DAG template from its finished graph.
///
/// - A path source takes the value captured for that path by the most
///   recently completed Succeeded task of the graph.
/// - An expression source is resolved against the graph's final scope
///   (inputs, Succeeded tasks' outputs and results, workflow values).
///
/// Pure: calling it again on the same scheduler gives the same result.
/// Fails with `UnresolvedOutput` naming the first output whose source is not
/// satisfied.
pub fn aggregate(template: &DagTemplate, scheduler: &Scheduler) -> Result<BTreeMap<String, String>> {
    let captured = captured_values(scheduler);
    let scope = scheduler.scope();
    let mut outputs = BTreeMap::new();

    for output in &template.outputs {
        let unresolved = |reason: String| DagweaveError::UnresolvedOutput {
            template: template.name.clone(),
            output: output.name.clone(),
            reason,
        };

        let value = match &output.source {
            OutputSource::Path(path) => captured
                .get(path)
                .cloned()
                .ok_or_else(|| unresolved(format!("no succeeded task captured '{path}'")))?,
            OutputSource::Expression(expr) => {
                resolve(expr, &scope).map_err(|e| unresolved(e.to_string()))?
            }
        };

        outputs.insert(output.name.clone(), value);
    }

    Ok(outputs)
}

/// Captured path values of all Succeeded tasks, later completions winning.
pub fn captured_values(scheduler: &Scheduler) -> BTreeMap<String, String> {
    let mut succeeded: Vec<_> = scheduler
        .instances()
        .filter(|t| t.state == TaskState::Succeeded)
        .collect();
    succeeded.sort_by_key(|t| t.completed_seq);

    let mut captured = BTreeMap::new();
    for task in succeeded {
        if let Some(outputs) = &task.outputs {
            captured.extend(
                outputs
                    .captured
                    .iter()
                    .map(|(path, value)| (path.clone(), value.clone())),
            );
        }
    }
    captured
}

/// Outputs of a script task from what the runner reported.
///
/// A path the runner did not report is `CaptureMissing`; an expression that
/// cannot be resolved against the script's inputs is `Resolution`.
pub fn script_outputs(
    template: &ScriptTemplate,
    inputs: &BTreeMap<String, String>,
    workflow: &WorkflowContext,
    output: &RunnerOutput,
) -> std::result::Result<BTreeMap<String, String>, FailureReason> {
    let scope = InputScope::new(workflow, inputs);
    let mut values = BTreeMap::new();

    for param in &template.outputs {
        let value = match &param.source {
            OutputSource::Path(path) => output.captured.get(path).cloned().ok_or_else(|| {
                FailureReason::CaptureMissing {
                    output: param.name.clone(),
                    path: path.clone(),
                }
            })?,
            OutputSource::Expression(expr) => resolve(expr, &scope)
                .map_err(|e| FailureReason::Resolution(e.to_string()))?,
        };
        values.insert(param.name.clone(), value);
    }

    Ok(values)
}
