// src/template/bind.rs

//! Binding call-site arguments to a template's declared inputs.

use std::collections::{BTreeMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{DagweaveError, Result};
use crate::expr::{Expression, InputScope, Reference, WorkflowContext, resolve};
use crate::template::Parameter;

/// Bind `args` to `params`, filling unset parameters from their defaults.
///
/// - An argument naming an undeclared parameter is `UnknownArgument`.
/// - A parameter with neither argument nor default is `MissingArgument`.
/// - Defaults may reference other inputs of the same template (resolved
///   recursively) and the workflow context. A default referencing task
///   outputs is `UnresolvedReference`: defaults are evaluated before any
///   task runs.
///
/// Argument values are taken verbatim; they have already been resolved by
/// the caller.
pub fn bind_inputs(
    template: &str,
    params: &[Parameter],
    args: &BTreeMap<String, String>,
    workflow: &WorkflowContext,
) -> Result<BTreeMap<String, String>> {
    for name in args.keys() {
        if !params.iter().any(|p| &p.name == name) {
            return Err(DagweaveError::UnknownArgument {
                template: template.to_string(),
                parameter: name.clone(),
            });
        }
    }

    let mut binder = Binder {
        template,
        params,
        args,
        workflow,
        bound: BTreeMap::new(),
        in_progress: HashSet::new(),
    };

    for param in params {
        binder.bind(&param.name)?;
    }

    Ok(binder.bound)
}

struct Binder<'a> {
    template: &'a str,
    params: &'a [Parameter],
    args: &'a BTreeMap<String, String>,
    workflow: &'a WorkflowContext,
    bound: BTreeMap<String, String>,
    in_progress: HashSet<&'a str>,
}

impl<'a> Binder<'a> {
    fn bind(&mut self, name: &str) -> Result<()> {
        if self.bound.contains_key(name) {
            return Ok(());
        }

        let params: &'a [Parameter] = self.params;
        let param = params
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DagweaveError::UnresolvedReference {
                reference: format!("inputs.parameters.{name}"),
                reason: format!("template '{}' declares no such input", self.template),
            })?;

        if let Some(value) = self.args.get(name) {
            self.bound.insert(name.to_string(), value.clone());
            return Ok(());
        }

        let Some(default) = param.default.as_deref() else {
            return Err(DagweaveError::MissingArgument {
                template: self.template.to_string(),
                parameter: name.to_string(),
            });
        };

        if !self.in_progress.insert(param.name.as_str()) {
            return Err(DagweaveError::CyclicDependency(format!(
                "defaults of template '{}' reference each other through '{}'",
                self.template, name
            )));
        }

        let expr = Expression::parse(default)?;
        for reference in expr.references() {
            match reference {
                Reference::Input(other) => self.bind(other)?,
                Reference::TaskOutput { .. } | Reference::TaskResult { .. } => {
                    return Err(runtime_only(self.template, name, reference));
                }
                Reference::WorkflowName | Reference::WorkflowParameter(_) => {}
            }
        }

        let value = resolve(&expr, &InputScope::new(self.workflow, &self.bound))?;
        self.in_progress.remove(param.name.as_str());
        self.bound.insert(name.to_string(), value);
        Ok(())
    }
}

/// Static checks on input defaults, run once at load time:
/// every default parses, references only declared inputs and known workflow
/// parameters, never task outputs, and defaults do not reference each other
/// in a cycle.
pub fn check_defaults(
    template: &str,
    params: &[Parameter],
    workflow: &WorkflowContext,
) -> Result<()> {
    // Edge direction: referenced input -> input whose default uses it.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for param in params {
        graph.add_node(param.name.as_str());
    }

    for param in params {
        let Some(default) = param.default.as_deref() else {
            continue;
        };
        let expr = Expression::parse(default)?;

        for reference in expr.references() {
            match reference {
                Reference::Input(other) => {
                    let Some(target) = params.iter().find(|p| &p.name == other) else {
                        return Err(DagweaveError::UnresolvedReference {
                            reference: reference.to_string(),
                            reason: format!(
                                "default of input '{}' of template '{}' names an undeclared input",
                                param.name, template
                            ),
                        });
                    };
                    graph.add_edge(target.name.as_str(), param.name.as_str(), ());
                }
                Reference::TaskOutput { .. } | Reference::TaskResult { .. } => {
                    return Err(runtime_only(template, &param.name, reference));
                }
                Reference::WorkflowParameter(name) => {
                    workflow.parameter(name).map_err(|reason| {
                        DagweaveError::UnresolvedReference {
                            reference: reference.to_string(),
                            reason,
                        }
                    })?;
                }
                Reference::WorkflowName => {}
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DagweaveError::CyclicDependency(format!(
            "defaults of template '{}' reference each other through '{}'",
            template,
            cycle.node_id()
        ))),
    }
}

fn runtime_only(template: &str, param: &str, reference: &Reference) -> DagweaveError {
    DagweaveError::UnresolvedReference {
        reference: reference.to_string(),
        reason: format!(
            "default of input '{param}' of template '{template}' needs task outputs, which only exist at run time"
        ),
    }
}
