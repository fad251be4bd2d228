// src/expr/resolve.rs

use std::collections::BTreeMap;

use crate::errors::{DagweaveError, Result};
use crate::expr::ast::{Expression, Reference, Segment};

/// Something references can be looked up in.
///
/// `lookup` returns the value, or a short human-readable reason why the
/// reference cannot be satisfied in this scope.
pub trait Scope {
    fn lookup(&self, reference: &Reference) -> std::result::Result<&str, String>;
}

/// Workflow-wide values visible from every scope: `{{workflow.name}}` and
/// `{{workflow.parameters.*}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowContext {
    pub name: String,
    pub parameters: BTreeMap<String, String>,
}

impl WorkflowContext {
    pub fn new(name: impl Into<String>, parameters: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> std::result::Result<&str, String> {
        self.parameters
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| format!("workflow has no parameter '{name}'"))
    }
}

/// Scope made of a template's bound inputs plus the workflow context.
///
/// Task references never resolve here; this is the scope for input
/// defaults, script sources and script output expressions.
#[derive(Debug, Clone, Copy)]
pub struct InputScope<'a> {
    pub workflow: &'a WorkflowContext,
    pub inputs: &'a BTreeMap<String, String>,
}

impl<'a> InputScope<'a> {
    pub fn new(workflow: &'a WorkflowContext, inputs: &'a BTreeMap<String, String>) -> Self {
        Self { workflow, inputs }
    }
}

impl Scope for InputScope<'_> {
    fn lookup(&self, reference: &Reference) -> std::result::Result<&str, String> {
        match reference {
            Reference::Input(name) => self
                .inputs
                .get(name)
                .map(String::as_str)
                .ok_or_else(|| format!("no input parameter named '{name}'")),
            Reference::TaskOutput { task, .. } | Reference::TaskResult { task } => Err(format!(
                "task '{task}' outputs are only available inside a DAG at run time"
            )),
            Reference::WorkflowName => Ok(&self.workflow.name),
            Reference::WorkflowParameter(name) => self.workflow.parameter(name),
        }
    }
}

/// Substitute every reference of `expr` using `scope`.
///
/// Pure textual substitution: values are inserted as-is and literal text is
/// copied verbatim.
pub fn resolve(expr: &Expression, scope: &dyn Scope) -> Result<String> {
    let mut out = String::with_capacity(expr.source().len());

    for segment in expr.segments() {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Reference(reference) => {
                let value = scope.lookup(reference).map_err(|reason| {
                    DagweaveError::UnresolvedReference {
                        reference: reference.to_string(),
                        reason,
                    }
                })?;
                out.push_str(value);
            }
        }
    }

    Ok(out)
}

/// Parse and resolve in one go.
pub fn resolve_str(source: &str, scope: &dyn Scope) -> Result<String> {
    let expr = Expression::parse(source)?;
    resolve(&expr, scope)
}
