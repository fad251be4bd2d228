// src/dag/builder.rs

//! Instantiating a DAG template into a validated [`DagGraph`].

use std::collections::{BTreeMap, BTreeSet, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::dag::graph::{DagGraph, TaskNode};
use crate::depends::{check_references, parse_optional};
use crate::errors::{DagweaveError, Result};
use crate::expr::{Expression, Reference, WorkflowContext};
use crate::template::{
    DagTemplate, OutputSource, TaskSpec, Template, TemplateRegistry, bind_inputs, check_defaults,
};

/// Builds graphs for DAG templates of one workflow.
#[derive(Debug, Clone, Copy)]
pub struct DagBuilder<'a> {
    registry: &'a TemplateRegistry,
    workflow: &'a WorkflowContext,
    fail_fast_default: bool,
}

impl<'a> DagBuilder<'a> {
    pub fn new(registry: &'a TemplateRegistry, workflow: &'a WorkflowContext) -> Self {
        Self {
            registry,
            workflow,
            fail_fast_default: false,
        }
    }

    /// Fail-fast setting for templates that do not choose one themselves.
    pub fn with_fail_fast_default(mut self, fail_fast: bool) -> Self {
        self.fail_fast_default = fail_fast;
        self
    }

    /// Bind `args` to the template's inputs and build its graph.
    ///
    /// Fails with a structural error if any argument, reference or `depends`
    /// expression is invalid or if the edges form a cycle. Nothing is
    /// resolved against task outputs here.
    pub fn build(&self, template: &DagTemplate, args: &BTreeMap<String, String>) -> Result<DagGraph> {
        let inputs = bind_inputs(&template.name, &template.inputs, args, self.workflow)?;
        let graph = self.assemble(template, inputs)?;

        debug!(
            template = %template.name,
            tasks = graph.len(),
            order = ?graph.topological_order(),
            "built DAG"
        );

        Ok(graph)
    }

    /// Look up `name` in the registry and build it. The template must be a
    /// DAG template.
    pub fn build_named(&self, name: &str, args: &BTreeMap<String, String>) -> Result<DagGraph> {
        match self.registry.lookup(name)? {
            Template::Dag(dag) => self.build(dag, args),
            Template::Script(_) => Err(DagweaveError::ManifestError(format!(
                "template '{name}' is a script template, not a DAG"
            ))),
        }
    }

    /// Structural validation without concrete arguments.
    ///
    /// Runs every check of [`DagBuilder::build`] except input binding, plus
    /// the static checks on the template's own input defaults. The returned
    /// graph has no bound inputs.
    pub fn validate(&self, template: &DagTemplate) -> Result<DagGraph> {
        check_defaults(&template.name, &template.inputs, self.workflow)?;
        self.assemble(template, BTreeMap::new())
    }

    fn assemble(&self, template: &DagTemplate, inputs: BTreeMap<String, String>) -> Result<DagGraph> {
        let mut siblings: HashSet<&str> = HashSet::with_capacity(template.tasks.len());
        for task in &template.tasks {
            if !siblings.insert(task.name.as_str()) {
                return Err(DagweaveError::ManifestError(format!(
                    "DAG template '{}' declares task '{}' twice",
                    template.name, task.name
                )));
            }
        }

        let mut nodes = Vec::with_capacity(template.tasks.len());
        for spec in &template.tasks {
            nodes.push(self.build_node(template, spec, &siblings)?);
        }

        self.check_outputs(template)?;

        let order = topological_order(&template.name, &nodes)?;
        let fail_fast = template.fail_fast.unwrap_or(self.fail_fast_default);

        Ok(DagGraph::from_parts(
            template.name.clone(),
            inputs,
            fail_fast,
            nodes,
            order,
        ))
    }

    fn build_node(
        &self,
        owner: &DagTemplate,
        spec: &TaskSpec,
        siblings: &HashSet<&str>,
    ) -> Result<TaskNode> {
        let callee = self.registry.lookup(&spec.template)?;

        for arg in spec.arguments.keys() {
            if !callee.inputs().iter().any(|p| &p.name == arg) {
                return Err(DagweaveError::UnknownArgument {
                    template: callee.name().to_string(),
                    parameter: arg.clone(),
                });
            }
        }
        for param in callee.inputs() {
            if param.default.is_none() && !spec.arguments.contains_key(&param.name) {
                return Err(DagweaveError::MissingArgument {
                    template: callee.name().to_string(),
                    parameter: param.name.clone(),
                });
            }
        }

        let mut arguments = BTreeMap::new();
        let mut producers = BTreeSet::new();

        for (name, raw) in &spec.arguments {
            let expr = Expression::parse(raw)?;
            for reference in expr.references() {
                self.check_reference(owner, reference)?;
                if let Some(task) = reference.task() {
                    producers.insert(task.to_string());
                }
            }
            arguments.insert(name.clone(), expr);
        }

        let depends = parse_optional(spec.depends.as_deref())?;
        if let Some(pred) = &depends {
            check_references(&spec.name, pred, siblings)?;
        }

        Ok(TaskNode {
            name: spec.name.clone(),
            template: spec.template.clone(),
            arguments,
            depends,
            producers,
        })
    }

    /// Expression-sourced outputs of a DAG template may reference its inputs,
    /// its tasks' outputs and the workflow context.
    fn check_outputs(&self, template: &DagTemplate) -> Result<()> {
        for output in &template.outputs {
            if let OutputSource::Expression(expr) = &output.source {
                for reference in expr.references() {
                    self.check_reference(template, reference)?;
                }
            }
        }
        Ok(())
    }

    /// Static check of one reference against the enclosing template: its
    /// declared inputs, its tasks' declared outputs, and workflow values.
    fn check_reference(&self, owner: &DagTemplate, reference: &Reference) -> Result<()> {
        let unresolved = |reason: String| DagweaveError::UnresolvedReference {
            reference: reference.to_string(),
            reason,
        };

        match reference {
            Reference::Input(name) => {
                if owner.inputs.iter().any(|p| &p.name == name) {
                    Ok(())
                } else {
                    Err(unresolved(format!(
                        "template '{}' declares no input '{}'",
                        owner.name, name
                    )))
                }
            }
            Reference::TaskOutput { task, parameter } => {
                let producer = self.producer_template(owner, task, &unresolved)?;
                if producer.declares_output(parameter) {
                    Ok(())
                } else {
                    Err(unresolved(format!(
                        "template '{}' of task '{}' declares no output '{}'",
                        producer.name(),
                        task,
                        parameter
                    )))
                }
            }
            Reference::TaskResult { task } => {
                let producer = self.producer_template(owner, task, &unresolved)?;
                if producer.is_dag() {
                    Err(unresolved(format!(
                        "task '{}' runs DAG template '{}', which has no result",
                        task,
                        producer.name()
                    )))
                } else {
                    Ok(())
                }
            }
            Reference::WorkflowName => Ok(()),
            Reference::WorkflowParameter(name) => {
                self.workflow.parameter(name).map(|_| ()).map_err(unresolved)
            }
        }
    }

    fn producer_template<F>(&self, owner: &DagTemplate, task: &str, unresolved: &F) -> Result<&'a Template>
    where
        F: Fn(String) -> DagweaveError,
    {
        let spec = owner.task(task).ok_or_else(|| {
            unresolved(format!(
                "template '{}' has no task named '{}'",
                owner.name, task
            ))
        })?;
        self.registry.lookup(&spec.template)
    }
}

/// Topological order of `nodes` over explicit and implicit edges.
fn topological_order(template: &str, nodes: &[TaskNode]) -> Result<Vec<String>> {
    // Edge direction: upstream -> downstream.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for node in nodes {
        graph.add_node(node.name.as_str());
    }

    for node in nodes {
        for producer in &node.producers {
            graph.add_edge(producer.as_str(), node.name.as_str(), ());
        }
        if let Some(pred) = &node.depends {
            for dep in pred.tasks() {
                graph.add_edge(dep, node.name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => Err(DagweaveError::CyclicDependency(format!(
            "cycle detected in DAG template '{}' involving task '{}'",
            template,
            cycle.node_id()
        ))),
    }
}
