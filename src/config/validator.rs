//! Structural validation of the decoded configuration.
//!
//! Two families of checks run before any cluster contact:
//!
//! - **Chart references**: a module chart needs a source (`repository` or
//!   `url`), and a repository source also needs a chart name (`name` or `chart`).
//! - **Module dependencies**: every `depends` entry must name an existing
//!   module and the graph of enabled dependencies must be acyclic.
//!
//! Cycle detection is a three-color depth-first search over a [`DiGraph`]
//! of modules. A node reached again while still on the recursion stack
//! closes a cycle, which is reported as the chain of module names.

use anyhow::Result;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

use super::document::{Document, ModuleChart};
use crate::core::KrateoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Validates a [`Document`].
pub struct Validator<'a> {
    document: &'a Document,
}

impl<'a> Validator<'a> {
    #[must_use]
    pub const fn new(document: &'a Document) -> Self {
        Self {
            document,
        }
    }

    /// Run every check.
    ///
    /// # Errors
    ///
    /// [`KrateoError::ConfigValidation`] describing the first failed check.
    pub fn validate(&self) -> Result<()> {
        for (name, module) in &self.document.modules {
            if name.trim().is_empty() {
                return Err(validation("module name cannot be empty"));
            }
            if let Some(chart) = &module.chart {
                validate_chart(name, chart)?;
            }
        }

        ModuleGraph::build(self.document)?.detect_cycles()
    }
}

fn validate_chart(module: &str, chart: &ModuleChart) -> Result<()> {
    let non_empty = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    if !non_empty(&chart.repository) && !non_empty(&chart.url) {
        return Err(validation(format!("module {module}: chart must have repository or url")));
    }
    if non_empty(&chart.repository) && !non_empty(&chart.name) && !non_empty(&chart.chart) {
        return Err(validation(format!(
            "module {module}: chart name is required when repository is specified"
        )));
    }
    Ok(())
}

fn validation(reason: impl Into<String>) -> anyhow::Error {
    KrateoError::ConfigValidation {
        reason: reason.into(),
    }
    .into()
}

/// Dependency graph over modules. Edges only point at enabled modules.
struct ModuleGraph {
    graph: DiGraph<String, ()>,
}

impl ModuleGraph {
    fn build(document: &Document) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();

        for name in document.modules.keys() {
            nodes.insert(name.as_str(), graph.add_node(name.clone()));
        }

        for (name, module) in &document.modules {
            for dep in &module.depends {
                let Some(target) = document.modules.get(dep) else {
                    return Err(validation(format!(
                        "module {name} depends on non-existent module {dep}"
                    )));
                };
                if !target.is_enabled() {
                    continue;
                }
                let (from, to) = (nodes[name.as_str()], nodes[dep.as_str()]);
                if !graph.contains_edge(from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Ok(Self {
            graph,
        })
    }

    fn detect_cycles(&self) -> Result<()> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();
        let mut path = Vec::new();

        for node in self.graph.node_indices() {
            if colors[&node] == Color::White
                && let Some(cycle) = self.dfs_visit(node, &mut colors, &mut path)
            {
                return Err(validation(format!(
                    "circular dependency detected: {}",
                    cycle.join(" → ")
                )));
            }
        }

        Ok(())
    }

    fn dfs_visit(
        &self,
        node: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        path: &mut Vec<NodeIndex>,
    ) -> Option<Vec<String>> {
        colors.insert(node, Color::Gray);
        path.push(node);

        // neighbors() yields edges newest first; walk them in declaration order
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.reverse();

        for neighbor in neighbors {
            match colors[&neighbor] {
                Color::Gray => {
                    let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        path[start..].iter().map(|n| self.graph[*n].clone()).collect();
                    cycle.push(self.graph[neighbor].clone());
                    return Some(cycle);
                }
                Color::White => {
                    if let Some(cycle) = self.dfs_visit(neighbor, colors, path) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        colors.insert(node, Color::Black);
        None
    }
}
