// src/manifest/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::template::TemplateRegistry;
use crate::types::DurationSpec;

/// Manifest exactly as read from TOML, before semantic validation.
///
/// ```toml
/// [workflow]
/// name = "dag-nested"
/// entrypoint = "main"
///
/// [config]
/// parallelism = 4
///
/// [[template]]
/// name = "echo"
/// inputs = [{ name = "message" }]
/// [template.script]
/// source = "echo {{inputs.parameters.message}}"
///
/// [[template]]
/// name = "main"
/// [[template.dag.tasks]]
/// name = "A"
/// template = "echo"
/// arguments = { message = "A" }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawManifest {
    pub workflow: WorkflowSection,

    #[serde(default)]
    pub config: ConfigSection,

    /// All `[[template]]` tables, in file order.
    #[serde(default, rename = "template")]
    pub templates: Vec<RawTemplate>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    pub name: String,

    /// Template the run starts from.
    pub entrypoint: String,

    /// Global parameters: visible everywhere as `{{workflow.parameters.*}}`
    /// and bound to the entrypoint's inputs of the same name.
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

/// `[config]` section: engine behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSection {
    /// Maximum number of script tasks running at once across the whole
    /// workflow. Unlimited when absent.
    #[serde(default)]
    pub parallelism: Option<usize>,

    /// Default per-task timeout; templates may override it.
    #[serde(default)]
    pub task_timeout: Option<DurationSpec>,

    /// Default fail-fast behaviour for DAG templates.
    #[serde(default)]
    pub fail_fast: bool,
}

/// One `[[template]]` table. Exactly one of `script` / `dag` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTemplate {
    pub name: String,

    #[serde(default)]
    pub inputs: Vec<RawParameter>,

    #[serde(default)]
    pub outputs: Vec<RawOutput>,

    #[serde(default)]
    pub script: Option<RawScript>,

    #[serde(default)]
    pub dag: Option<RawDag>,

    /// Per-task timeout for script templates.
    #[serde(default)]
    pub timeout: Option<DurationSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawParameter {
    pub name: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// Output declaration. Exactly one of `path` / `expression` must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub expression: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawScript {
    #[serde(default)]
    pub image: Option<String>,
    /// Defaults to `["sh", "-c"]`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDag {
    #[serde(default)]
    pub fail_fast: Option<bool>,
    #[serde(default)]
    pub tasks: Vec<RawTask>,
}

/// `[[template.dag.tasks]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTask {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
    /// Boolean expression over sibling task names.
    #[serde(default)]
    pub depends: Option<String>,
    /// List form: every listed task must succeed. Mutually exclusive with
    /// `depends`.
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
}

/// A validated manifest: templates registered, names checked.
///
/// Only constructed through `TryFrom<RawManifest>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct Manifest {
    pub workflow: WorkflowSection,
    pub config: ConfigSection,
    pub registry: TemplateRegistry,
}

impl Manifest {
    pub(crate) fn new_unchecked(
        workflow: WorkflowSection,
        config: ConfigSection,
        registry: TemplateRegistry,
    ) -> Self {
        Self {
            workflow,
            config,
            registry,
        }
    }
}
