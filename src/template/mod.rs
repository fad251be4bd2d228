// src/template/mod.rs

//! Templates: the named, immutable units of work a workflow is made of.
//!
//! - [`Template`] is either a [`ScriptTemplate`] (an opaque runnable body
//!   handed to the task runner) or a [`DagTemplate`] (a list of task
//!   invocations).
//! - [`registry`] holds all templates of a workflow, looked up by name.
//! - [`bind`] binds call-site arguments to a template's inputs, applying
//!   defaults.

pub mod bind;
pub mod registry;

use std::collections::BTreeMap;
use std::time::Duration;

use crate::expr::Expression;

pub use bind::{bind_inputs, check_defaults};
pub use registry::TemplateRegistry;

/// An input parameter declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// Raw default; may contain `{{inputs.parameters.*}}` and
    /// `{{workflow.*}}` placeholders, never task references.
    pub default: Option<String>,
}

impl Parameter {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: Some(default.into()),
        }
    }
}

/// Where an output parameter's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSource {
    /// The runner reports what was written to this path.
    Path(String),
    /// Resolved against the template's scope once it has finished.
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputParameter {
    pub name: String,
    pub source: OutputSource,
}

/// Opaque execution specification for a script template.
///
/// The engine never interprets this; it is passed to the
/// [`crate::exec::TaskRunner`] as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSpec {
    /// Optional image reference for runners that execute in containers.
    pub image: Option<String>,
    /// Program and leading arguments; the source is appended as the last
    /// argument.
    pub command: Vec<String>,
    pub source: String,
}

impl ScriptSpec {
    pub fn default_command() -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTemplate {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<OutputParameter>,
    pub script: ScriptSpec,
    /// Per-template timeout, overriding the workflow default.
    pub timeout: Option<Duration>,
}

/// One task invocation inside a DAG template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    /// Name of the template to invoke.
    pub template: String,
    /// Parameter name -> raw expression.
    pub arguments: BTreeMap<String, String>,
    /// Raw `depends` expression over sibling task names.
    pub depends: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagTemplate {
    pub name: String,
    pub inputs: Vec<Parameter>,
    pub outputs: Vec<OutputParameter>,
    pub tasks: Vec<TaskSpec>,
    /// Overrides the workflow-wide fail-fast setting for this DAG.
    pub fail_fast: Option<bool>,
}

impl DagTemplate {
    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Template {
    Script(ScriptTemplate),
    Dag(DagTemplate),
}

impl Template {
    pub fn name(&self) -> &str {
        match self {
            Template::Script(t) => &t.name,
            Template::Dag(t) => &t.name,
        }
    }

    pub fn inputs(&self) -> &[Parameter] {
        match self {
            Template::Script(t) => &t.inputs,
            Template::Dag(t) => &t.inputs,
        }
    }

    pub fn outputs(&self) -> &[OutputParameter] {
        match self {
            Template::Script(t) => &t.outputs,
            Template::Dag(t) => &t.outputs,
        }
    }

    pub fn declares_output(&self, name: &str) -> bool {
        self.outputs().iter().any(|o| o.name == name)
    }

    pub fn is_dag(&self) -> bool {
        matches!(self, Template::Dag(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Template::Script(_) => "script",
            Template::Dag(_) => "dag",
        }
    }
}
