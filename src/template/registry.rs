// src/template/registry.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::errors::{DagweaveError, Result};
use crate::template::Template;

/// Immutable-after-load lookup table of a workflow's templates.
///
/// Built once when the manifest is loaded and then shared read-only (behind
/// an `Arc`) by every graph of the run.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: BTreeMap<String, Template>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template; names must be unique.
    pub fn register(&mut self, template: Template) -> Result<()> {
        let name = template.name().to_string();
        if self.templates.contains_key(&name) {
            return Err(DagweaveError::DuplicateTemplateName(name));
        }
        debug!(template = %name, kind = template.kind(), "registered template");
        self.templates.insert(name, template);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Template> {
        self.templates
            .get(name)
            .ok_or_else(|| DagweaveError::UnknownTemplate(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.values()
    }

    /// Reject DAG templates that invoke themselves, directly or through
    /// other DAG templates.
    ///
    /// Task specs referencing unknown templates are ignored here; the DAG
    /// builder reports those.
    pub fn check_recursion(&self) -> Result<()> {
        // Edge direction: caller -> callee.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for template in self.templates.values() {
            graph.add_node(template.name());
            if let Template::Dag(dag) = template {
                for task in &dag.tasks {
                    if let Some(callee) = self.templates.get(&task.template) {
                        if callee.is_dag() {
                            graph.add_edge(dag.name.as_str(), callee.name(), ());
                        }
                    }
                }
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(DagweaveError::CyclicDependency(format!(
                "template '{}' invokes itself through its DAG tasks",
                cycle.node_id()
            ))),
        }
    }
}
