// src/expr/ast.rs

use std::fmt;

use crate::errors::Result;

/// One piece of a parsed expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text copied verbatim into the result.
    Literal(String),
    /// A `{{...}}` placeholder.
    Reference(Reference),
}

/// What a placeholder points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    /// `{{inputs.parameters.NAME}}`
    Input(String),
    /// `{{tasks.TASK.outputs.parameters.NAME}}`
    TaskOutput { task: String, parameter: String },
    /// `{{tasks.TASK.outputs.result}}`
    TaskResult { task: String },
    /// `{{workflow.name}}`
    WorkflowName,
    /// `{{workflow.parameters.NAME}}`
    WorkflowParameter(String),
}

impl Reference {
    /// Name of the sibling task this reference reads from, if any.
    pub fn task(&self) -> Option<&str> {
        match self {
            Reference::TaskOutput { task, .. } | Reference::TaskResult { task } => Some(task),
            _ => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Input(name) => write!(f, "inputs.parameters.{name}"),
            Reference::TaskOutput { task, parameter } => {
                write!(f, "tasks.{task}.outputs.parameters.{parameter}")
            }
            Reference::TaskResult { task } => write!(f, "tasks.{task}.outputs.result"),
            Reference::WorkflowName => write!(f, "workflow.name"),
            Reference::WorkflowParameter(name) => write!(f, "workflow.parameters.{name}"),
        }
    }
}

/// A parsed expression: the original text plus its segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    source: String,
    segments: Vec<Segment>,
}

impl Expression {
    /// Parse `source` into an expression.
    ///
    /// Fails with `MalformedExpression` on an unclosed, empty or
    /// unrecognised placeholder.
    pub fn parse(source: &str) -> Result<Self> {
        let segments = super::parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// All references in order of appearance.
    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Reference(r) => Some(r),
            Segment::Literal(_) => None,
        })
    }

    /// Names of sibling tasks whose outputs this expression reads.
    pub fn task_references(&self) -> impl Iterator<Item = &str> {
        self.references().filter_map(Reference::task)
    }

    /// True if the expression has no placeholders at all.
    pub fn is_literal(&self) -> bool {
        self.references().next().is_none()
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
