// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::depends::Predicate;
use crate::engine::TaskName;
use crate::expr::Expression;

/// A task of an instantiated graph.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub name: TaskName,
    /// Template this task invokes.
    pub template: String,
    /// Parsed argument expressions, resolved when the task becomes Ready.
    pub arguments: BTreeMap<String, Expression>,
    /// Parsed `depends` predicate, if any.
    pub depends: Option<Predicate>,
    /// Tasks whose outputs the arguments reference. All of them must have
    /// Succeeded before this task can run.
    pub producers: BTreeSet<TaskName>,
}

/// Validated, acyclic task graph of one DAG template instantiation.
///
/// Edges are the union of explicit `depends` atoms and implicit references
/// from argument expressions. The graph never changes once built; per-task
/// run state lives in the [`crate::dag::Scheduler`].
#[derive(Debug, Clone)]
pub struct DagGraph {
    template: String,
    inputs: BTreeMap<String, String>,
    fail_fast: bool,
    nodes: HashMap<TaskName, TaskNode>,
    deps: HashMap<TaskName, Vec<TaskName>>,
    dependents: HashMap<TaskName, Vec<TaskName>>,
    order: Vec<TaskName>,
}

impl DagGraph {
    /// Assemble a graph from already-validated parts.
    ///
    /// `order` must be a topological order of `nodes` w.r.t. the edges
    /// implied by `depends` and `producers`; [`crate::dag::DagBuilder`]
    /// guarantees this.
    pub(crate) fn from_parts(
        template: String,
        inputs: BTreeMap<String, String>,
        fail_fast: bool,
        nodes: Vec<TaskNode>,
        order: Vec<TaskName>,
    ) -> Self {
        let mut deps: HashMap<TaskName, Vec<TaskName>> = HashMap::new();
        let mut dependents: HashMap<TaskName, Vec<TaskName>> = HashMap::new();

        for node in &nodes {
            let mut upstream: BTreeSet<&str> = node.producers.iter().map(String::as_str).collect();
            if let Some(pred) = &node.depends {
                upstream.extend(pred.tasks());
            }

            deps.insert(
                node.name.clone(),
                upstream.iter().map(|s| s.to_string()).collect(),
            );
            dependents.entry(node.name.clone()).or_default();

            for dep in upstream {
                dependents
                    .entry(dep.to_string())
                    .or_default()
                    .push(node.name.clone());
            }
        }

        let nodes = nodes.into_iter().map(|n| (n.name.clone(), n)).collect();

        Self {
            template,
            inputs,
            fail_fast,
            nodes,
            deps,
            dependents,
            order,
        }
    }

    /// Name of the DAG template this graph instantiates.
    pub fn template_name(&self) -> &str {
        &self.template
    }

    /// Bound input values of the template.
    pub fn inputs(&self) -> &BTreeMap<String, String> {
        &self.inputs
    }

    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, name: &str) -> Option<&TaskNode> {
        self.nodes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Task names in the recorded topological order.
    pub fn topological_order(&self) -> &[TaskName] {
        &self.order
    }

    /// Nodes in topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.order.iter().filter_map(|name| self.nodes.get(name))
    }

    /// Immediate upstream tasks (explicit and implicit).
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.deps.get(name).map(|d| d.as_slice()).unwrap_or(&[])
    }

    /// Immediate downstream tasks.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.dependents
            .get(name)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// All edges as `(upstream, downstream)` pairs, in topological order of
    /// the downstream task.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.order
            .iter()
            .flat_map(|task| {
                self.dependencies_of(task)
                    .iter()
                    .map(move |dep| (dep.as_str(), task.as_str()))
            })
            .collect()
    }
}
