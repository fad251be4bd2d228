#![allow(dead_code)]

use std::collections::BTreeMap;

use dagweave::manifest::{
    ConfigSection, Manifest, RawDag, RawManifest, RawOutput, RawParameter, RawScript, RawTask,
    RawTemplate, WorkflowSection,
};
use dagweave::types::DurationSpec;
use dagweave::workflow::Workflow;

/// Builder for `RawManifest` to simplify test setup.
pub struct ManifestBuilder {
    manifest: RawManifest,
}

impl ManifestBuilder {
    pub fn new(entrypoint: &str) -> Self {
        Self {
            manifest: RawManifest {
                workflow: WorkflowSection {
                    name: "test-workflow".to_string(),
                    entrypoint: entrypoint.to_string(),
                    arguments: BTreeMap::new(),
                },
                config: ConfigSection::default(),
                templates: Vec::new(),
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.manifest.workflow.name = name.to_string();
        self
    }

    pub fn argument(mut self, name: &str, value: &str) -> Self {
        self.manifest
            .workflow
            .arguments
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn parallelism(mut self, n: usize) -> Self {
        self.manifest.config.parallelism = Some(n);
        self
    }

    pub fn task_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.manifest.config.task_timeout = Some(DurationSpec::from(timeout));
        self
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        self.manifest.config.fail_fast = val;
        self
    }

    pub fn template(mut self, template: TemplateBuilder) -> Self {
        self.manifest.templates.push(template.build());
        self
    }

    pub fn raw(self) -> RawManifest {
        self.manifest
    }

    pub fn try_build(self) -> dagweave::errors::Result<Manifest> {
        Manifest::try_from(self.manifest)
    }

    pub fn build(self) -> Manifest {
        self.try_build()
            .expect("Failed to build valid manifest from builder")
    }

    pub fn try_workflow(self) -> dagweave::errors::Result<Workflow> {
        Workflow::from_manifest(self.try_build()?)
    }

    pub fn workflow(self) -> Workflow {
        self.try_workflow()
            .expect("Failed to build valid workflow from builder")
    }
}

/// Builder for `RawTemplate`, script or DAG.
pub struct TemplateBuilder {
    template: RawTemplate,
}

impl TemplateBuilder {
    fn empty(name: &str) -> RawTemplate {
        RawTemplate {
            name: name.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            script: None,
            dag: None,
            timeout: None,
        }
    }

    pub fn script(name: &str, source: &str) -> Self {
        let mut template = Self::empty(name);
        template.script = Some(RawScript {
            image: None,
            command: None,
            source: source.to_string(),
        });
        Self { template }
    }

    pub fn dag(name: &str) -> Self {
        let mut template = Self::empty(name);
        template.dag = Some(RawDag {
            fail_fast: None,
            tasks: Vec::new(),
        });
        Self { template }
    }

    pub fn input(mut self, name: &str) -> Self {
        self.template.inputs.push(RawParameter {
            name: name.to_string(),
            default: None,
        });
        self
    }

    pub fn input_default(mut self, name: &str, default: &str) -> Self {
        self.template.inputs.push(RawParameter {
            name: name.to_string(),
            default: Some(default.to_string()),
        });
        self
    }

    pub fn output_path(mut self, name: &str, path: &str) -> Self {
        self.template.outputs.push(RawOutput {
            name: name.to_string(),
            path: Some(path.to_string()),
            expression: None,
        });
        self
    }

    pub fn output_expr(mut self, name: &str, expression: &str) -> Self {
        self.template.outputs.push(RawOutput {
            name: name.to_string(),
            path: None,
            expression: Some(expression.to_string()),
        });
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.template.timeout = Some(DurationSpec::from(timeout));
        self
    }

    pub fn command(mut self, command: &[&str]) -> Self {
        if let Some(script) = self.template.script.as_mut() {
            script.command = Some(command.iter().map(|s| s.to_string()).collect());
        }
        self
    }

    pub fn fail_fast(mut self, val: bool) -> Self {
        if let Some(dag) = self.template.dag.as_mut() {
            dag.fail_fast = Some(val);
        }
        self
    }

    pub fn task(mut self, task: TaskBuilder) -> Self {
        if let Some(dag) = self.template.dag.as_mut() {
            dag.tasks.push(task.build());
        }
        self
    }

    pub fn build(self) -> RawTemplate {
        self.template
    }
}

/// Builder for a `[[template.dag.tasks]]` entry.
pub struct TaskBuilder {
    task: RawTask,
}

impl TaskBuilder {
    pub fn new(name: &str, template: &str) -> Self {
        Self {
            task: RawTask {
                name: name.to_string(),
                template: template.to_string(),
                arguments: BTreeMap::new(),
                depends: None,
                dependencies: None,
            },
        }
    }

    pub fn arg(mut self, name: &str, value: &str) -> Self {
        self.task
            .arguments
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn depends(mut self, expr: &str) -> Self {
        self.task.depends = Some(expr.to_string());
        self
    }

    pub fn dependencies(mut self, deps: &[&str]) -> Self {
        self.task.dependencies = Some(deps.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> RawTask {
        self.task
    }
}
