// src/workflow.rs

//! A loaded, validated workflow ready to run.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::{DagBuilder, DagGraph};
use crate::engine::{Runtime, RuntimeOptions, TemplateRun};
use crate::errors::{DagweaveError, Result};
use crate::exec::TaskRunner;
use crate::expr::{Reference, WorkflowContext};
use crate::manifest::Manifest;
use crate::template::{OutputSource, ScriptTemplate, Template, TemplateRegistry, check_defaults};

/// Registry + entrypoint + workflow parameters + engine options.
///
/// Construction validates the whole workflow: every DAG template is built
/// statically once, so a structural error anywhere surfaces before any task
/// runs.
#[derive(Debug, Clone)]
pub struct Workflow {
    entrypoint: String,
    registry: Arc<TemplateRegistry>,
    context: Arc<WorkflowContext>,
    options: RuntimeOptions,
}

impl Workflow {
    pub fn new(
        name: impl Into<String>,
        entrypoint: impl Into<String>,
        arguments: BTreeMap<String, String>,
        registry: TemplateRegistry,
        options: RuntimeOptions,
    ) -> Result<Self> {
        let workflow = Self {
            entrypoint: entrypoint.into(),
            registry: Arc::new(registry),
            context: Arc::new(WorkflowContext::new(name, arguments)),
            options,
        };
        workflow.validate()?;
        Ok(workflow)
    }

    pub fn from_manifest(manifest: Manifest) -> Result<Self> {
        let options = RuntimeOptions {
            parallelism: manifest.config.parallelism,
            task_timeout: manifest.config.task_timeout.map(|t| t.as_duration()),
            fail_fast: manifest.config.fail_fast,
        };

        Self::new(
            manifest.workflow.name,
            manifest.workflow.entrypoint,
            manifest.workflow.arguments,
            manifest.registry,
            options,
        )
    }

    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Workflow parameters that the entrypoint declares as inputs.
    ///
    /// Parameters the entrypoint does not declare stay visible through
    /// `{{workflow.parameters.*}}` only.
    pub fn entry_arguments(&self) -> Result<BTreeMap<String, String>> {
        let entry = self.registry.lookup(&self.entrypoint)?;
        Ok(self
            .context
            .parameters
            .iter()
            .filter(|(name, _)| entry.inputs().iter().any(|p| &p.name == *name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn builder(&self) -> DagBuilder<'_> {
        DagBuilder::new(&self.registry, &self.context).with_fail_fast_default(self.options.fail_fast)
    }

    fn validate(&self) -> Result<()> {
        self.registry.lookup(&self.entrypoint)?;
        self.registry.check_recursion()?;

        let builder = self.builder();
        for template in self.registry.iter() {
            match template {
                Template::Dag(dag) => {
                    builder.validate(dag)?;
                }
                Template::Script(script) => {
                    check_defaults(&script.name, &script.inputs, &self.context)?;
                    self.check_script_outputs(script)?;
                }
            }
        }

        debug!(
            workflow = %self.context.name,
            templates = self.registry.len(),
            "workflow validated"
        );
        Ok(())
    }

    /// Expression outputs of a script see its inputs and the workflow
    /// context only.
    fn check_script_outputs(&self, script: &ScriptTemplate) -> Result<()> {
        for output in &script.outputs {
            let OutputSource::Expression(expr) = &output.source else {
                continue;
            };
            for reference in expr.references() {
                let reason = match reference {
                    Reference::Input(name) if !script.inputs.iter().any(|p| &p.name == name) => {
                        Some(format!("template '{}' declares no input '{}'", script.name, name))
                    }
                    Reference::TaskOutput { .. } | Reference::TaskResult { .. } => Some(format!(
                        "output '{}' of script template '{}' cannot reference tasks",
                        output.name, script.name
                    )),
                    Reference::WorkflowParameter(name) => self.context.parameter(name).err(),
                    _ => None,
                };
                if let Some(reason) = reason {
                    return Err(DagweaveError::UnresolvedReference {
                        reference: reference.to_string(),
                        reason,
                    });
                }
            }
        }
        Ok(())
    }

    /// Statically built graphs of every DAG template, in name order. The
    /// entrypoint (if it is a DAG) is built with its actual arguments.
    pub fn graphs(&self) -> Result<Vec<DagGraph>> {
        let builder = self.builder();
        let entry_args = self.entry_arguments()?;

        self.registry
            .iter()
            .filter_map(|template| match template {
                Template::Dag(dag) if dag.name == self.entrypoint => {
                    Some(builder.build(dag, &entry_args))
                }
                Template::Dag(dag) => Some(builder.validate(dag)),
                Template::Script(_) => None,
            })
            .collect()
    }

    /// Runtime for this workflow. Keep it to obtain a
    /// [`crate::engine::ShutdownHandle`] before running.
    pub fn runtime(&self, runner: Arc<dyn TaskRunner>) -> Runtime {
        Runtime::new(
            self.registry.clone(),
            self.context.clone(),
            runner,
            self.options,
        )
    }

    /// Run the entrypoint with `runner`.
    pub async fn run(&self, runner: Arc<dyn TaskRunner>) -> Result<TemplateRun> {
        let runtime = self.runtime(runner);
        self.run_with(&runtime).await
    }

    /// Run the entrypoint on an existing runtime.
    pub async fn run_with(&self, runtime: &Runtime) -> Result<TemplateRun> {
        let args = self.entry_arguments()?;
        info!(
            workflow = %self.context.name,
            entrypoint = %self.entrypoint,
            "starting workflow"
        );
        let run = runtime.run_template(&self.entrypoint, args).await?;
        info!(
            workflow = %self.context.name,
            phase = %run.phase,
            "workflow finished"
        );
        Ok(run)
    }
}
