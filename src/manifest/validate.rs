// src/manifest/validate.rs

use std::collections::HashSet;

use anyhow::Context;
use regex::Regex;

use crate::errors::{DagweaveError, Result};
use crate::expr::Expression;
use crate::manifest::model::{
    Manifest, RawDag, RawManifest, RawOutput, RawParameter, RawScript, RawTask, RawTemplate,
};
use crate::template::{
    DagTemplate, OutputParameter, OutputSource, Parameter, ScriptSpec, ScriptTemplate, TaskSpec,
    Template, TemplateRegistry,
};

const NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_-]*$";

impl TryFrom<RawManifest> for Manifest {
    type Error = DagweaveError;

    fn try_from(raw: RawManifest) -> std::result::Result<Self, Self::Error> {
        ensure_has_templates(&raw)?;

        let names = NameCheck::new()?;
        validate_global_config(&raw, &names)?;

        let mut registry = TemplateRegistry::new();
        for template in &raw.templates {
            registry.register(convert_template(template, &names)?)?;
        }

        registry.lookup(&raw.workflow.entrypoint)?;

        Ok(Manifest::new_unchecked(raw.workflow, raw.config, registry))
    }
}

fn ensure_has_templates(raw: &RawManifest) -> Result<()> {
    if raw.templates.is_empty() {
        return Err(DagweaveError::ManifestError(
            "manifest must contain at least one [[template]] table".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawManifest, names: &NameCheck) -> Result<()> {
    if raw.config.parallelism == Some(0) {
        return Err(DagweaveError::ManifestError(
            "[config].parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    for name in raw.workflow.arguments.keys() {
        names.check("workflow argument", name)?;
    }
    Ok(())
}

fn convert_template(raw: &RawTemplate, names: &NameCheck) -> Result<Template> {
    names.check("template", &raw.name)?;

    let inputs = convert_inputs(&raw.name, &raw.inputs, names)?;
    let outputs = convert_outputs(&raw.name, &raw.outputs, names)?;

    match (&raw.script, &raw.dag) {
        (Some(script), None) => Ok(Template::Script(ScriptTemplate {
            name: raw.name.clone(),
            inputs,
            outputs,
            script: convert_script(&raw.name, script)?,
            timeout: raw.timeout.map(|t| t.as_duration()),
        })),
        (None, Some(dag)) => {
            if raw.timeout.is_some() {
                return Err(DagweaveError::ManifestError(format!(
                    "template '{}': `timeout` applies to script templates only",
                    raw.name
                )));
            }
            Ok(Template::Dag(DagTemplate {
                name: raw.name.clone(),
                inputs,
                outputs,
                tasks: convert_tasks(&raw.name, dag, names)?,
                fail_fast: dag.fail_fast,
            }))
        }
        (Some(_), Some(_)) => Err(DagweaveError::ManifestError(format!(
            "template '{}' declares both `script` and `dag`",
            raw.name
        ))),
        (None, None) => Err(DagweaveError::ManifestError(format!(
            "template '{}' declares neither `script` nor `dag`",
            raw.name
        ))),
    }
}

fn convert_inputs(
    template: &str,
    raw: &[RawParameter],
    names: &NameCheck,
) -> Result<Vec<Parameter>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for param in raw {
        names.check("input parameter", &param.name)?;
        if !seen.insert(param.name.as_str()) {
            return Err(DagweaveError::ManifestError(format!(
                "template '{}' declares input '{}' twice",
                template, param.name
            )));
        }
        out.push(Parameter {
            name: param.name.clone(),
            default: param.default.clone(),
        });
    }

    Ok(out)
}

fn convert_outputs(
    template: &str,
    raw: &[RawOutput],
    names: &NameCheck,
) -> Result<Vec<OutputParameter>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());

    for output in raw {
        names.check("output parameter", &output.name)?;
        if !seen.insert(output.name.as_str()) {
            return Err(DagweaveError::ManifestError(format!(
                "template '{}' declares output '{}' twice",
                template, output.name
            )));
        }

        let source = match (&output.path, &output.expression) {
            (Some(path), None) => {
                if path.trim().is_empty() {
                    return Err(DagweaveError::ManifestError(format!(
                        "output '{}' of template '{}' has an empty path",
                        output.name, template
                    )));
                }
                OutputSource::Path(path.clone())
            }
            (None, Some(expr)) => OutputSource::Expression(Expression::parse(expr)?),
            _ => {
                return Err(DagweaveError::ManifestError(format!(
                    "output '{}' of template '{}' must set exactly one of `path` or `expression`",
                    output.name, template
                )));
            }
        };

        out.push(OutputParameter {
            name: output.name.clone(),
            source,
        });
    }

    Ok(out)
}

fn convert_script(template: &str, raw: &RawScript) -> Result<ScriptSpec> {
    let command = match &raw.command {
        Some(cmd) if cmd.is_empty() => {
            return Err(DagweaveError::ManifestError(format!(
                "template '{template}': script `command` must not be empty"
            )));
        }
        Some(cmd) => cmd.clone(),
        None => ScriptSpec::default_command(),
    };

    Ok(ScriptSpec {
        image: raw.image.clone(),
        command,
        source: raw.source.clone(),
    })
}

fn convert_tasks(template: &str, raw: &RawDag, names: &NameCheck) -> Result<Vec<TaskSpec>> {
    if raw.tasks.is_empty() {
        return Err(DagweaveError::ManifestError(format!(
            "DAG template '{template}' must contain at least one task"
        )));
    }

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.tasks.len());

    for task in &raw.tasks {
        names.check("task", &task.name)?;
        if !seen.insert(task.name.as_str()) {
            return Err(DagweaveError::ManifestError(format!(
                "DAG template '{}' declares task '{}' twice",
                template, task.name
            )));
        }
        out.push(convert_task(template, task)?);
    }

    Ok(out)
}

fn convert_task(template: &str, raw: &RawTask) -> Result<TaskSpec> {
    let depends = match (&raw.depends, &raw.dependencies) {
        (Some(_), Some(_)) => {
            return Err(DagweaveError::ManifestError(format!(
                "task '{}' in template '{}' sets both `depends` and `dependencies`",
                raw.name, template
            )));
        }
        (Some(expr), None) => Some(expr.clone()),
        (None, Some(list)) if list.is_empty() => None,
        (None, Some(list)) => Some(list.join(" && ")),
        (None, None) => None,
    };

    Ok(TaskSpec {
        name: raw.name.clone(),
        template: raw.template.clone(),
        arguments: raw.arguments.clone(),
        depends,
    })
}

/// Identifier rule shared by templates, tasks and parameters.
struct NameCheck(Regex);

impl NameCheck {
    fn new() -> Result<Self> {
        let re = Regex::new(NAME_PATTERN).context("compiling name pattern")?;
        Ok(Self(re))
    }

    fn check(&self, kind: &str, name: &str) -> Result<()> {
        if self.0.is_match(name) {
            Ok(())
        } else {
            Err(DagweaveError::ManifestError(format!(
                "invalid {kind} name '{name}': expected letters, digits, '_' or '-', not starting with '_' or '-'"
            )))
        }
    }
}
