//! Dependency graph storage and ordering.
//!
//! Nodes live in an arena addressed by [`NodeId`]; edges are index vectors
//! in both directions. Cycle detection uses the classic three-colour scheme
//! (unvisited / on-stack / done) during a depth-first walk.

use std::collections::BTreeMap;

use crate::dsl::Resource;
use crate::error::EngineError;

/// Arena index of a graph node.
pub type NodeId = usize;

/// A resource plus its dependency edges.
#[derive(Debug)]
pub struct GraphNode {
    pub resource: Resource,
    /// Out-edges: nodes this resource depends on.
    pub depends_on: Vec<NodeId>,
    /// In-edges: nodes that depend on this resource.
    pub depended_on_by: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    OnStack,
    Done,
}

/// The typed dependency graph over all resources of a run.
#[derive(Debug)]
pub struct ResourceGraph {
    nodes: Vec<GraphNode>,
    /// `"type.name"` → node, sorted, so iteration order is deterministic.
    index: BTreeMap<String, NodeId>,
}

impl ResourceGraph {
    /// Build the graph: one node per resource keyed by `"type.name"`, then
    /// link the dependency edges.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::MissingDependency`] when a `depends_on` entry
    /// names a resource that does not exist.
    pub fn build(resources: Vec<Resource>) -> Result<Self, EngineError> {
        let mut nodes = Vec::with_capacity(resources.len());
        let mut index = BTreeMap::new();

        for resource in resources {
            index.insert(resource.id(), nodes.len());
            nodes.push(GraphNode {
                resource,
                depends_on: Vec::new(),
                depended_on_by: Vec::new(),
            });
        }

        let entries: Vec<(String, NodeId)> =
            index.iter().map(|(id, &n)| (id.clone(), n)).collect();
        for (id, node_id) in entries {
            let dependencies = nodes[node_id].resource.depends_on.clone();
            for dependency in dependencies {
                let target = *index.get(&dependency).ok_or_else(|| {
                    EngineError::MissingDependency {
                        resource: id.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                nodes[node_id].depends_on.push(target);
                nodes[target].depended_on_by.push(node_id);
            }
        }

        Ok(Self { nodes, index })
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &GraphNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut GraphNode {
        &mut self.nodes[id]
    }

    /// Node ids in sorted `"type.name"` order.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<NodeId> {
        self.index.values().copied().collect()
    }

    /// Topological order with dependencies preceding dependents.
    ///
    /// A depth-first post-order walk over the `depends_on` edges: each node
    /// is emitted after everything it depends on. The outer loop runs in
    /// sorted key order, so sibling order is deterministic for a given input.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DependencyCycle`] naming a resource on the
    /// cycle when an on-stack node is reached during descent.
    pub fn topo_sort(&self) -> Result<Vec<NodeId>, EngineError> {
        let mut colors = vec![Color::Unvisited; self.nodes.len()];
        let mut order = Vec::with_capacity(self.index.len());

        for &node_id in self.index.values() {
            self.visit(node_id, &mut colors, &mut order)?;
        }

        Ok(order)
    }

    fn visit(
        &self,
        id: NodeId,
        colors: &mut [Color],
        order: &mut Vec<NodeId>,
    ) -> Result<(), EngineError> {
        match colors[id] {
            Color::OnStack => {
                return Err(EngineError::DependencyCycle(self.nodes[id].resource.id()))
            }
            Color::Done => return Ok(()),
            Color::Unvisited => {}
        }

        colors[id] = Color::OnStack;
        for &dep in &self.nodes[id].depends_on {
            self.visit(dep, colors, order)?;
        }
        colors[id] = Color::Done;
        order.push(id);

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn resource(kind: &str, name: &str, deps: &[&str]) -> Resource {
        Resource {
            kind: kind.to_string(),
            name: name.to_string(),
            depends_on: deps.iter().map(|d| (*d).to_string()).collect(),
            ..Resource::default()
        }
    }

    fn names_in_order(graph: &ResourceGraph) -> Vec<String> {
        graph
            .topo_sort()
            .unwrap()
            .into_iter()
            .map(|id| graph.node(id).resource.name.clone())
            .collect()
    }

    #[test]
    fn build_links_edges_both_ways() {
        let graph = ResourceGraph::build(vec![
            resource("file", "file1", &[]),
            resource("file", "file2", &["file.file1"]),
            resource("service", "service1", &["file.file2"]),
        ])
        .unwrap();

        let ids = graph.sorted_ids();
        assert_eq!(ids.len(), 3);

        let file1 = *graph
            .index
            .get("file.file1")
            .expect("file.file1 should be in the graph");
        assert!(graph.node(file1).depends_on.is_empty());
        assert_eq!(graph.node(file1).depended_on_by.len(), 1);

        let file2 = *graph.index.get("file.file2").unwrap();
        assert_eq!(graph.node(file2).depends_on, vec![file1]);
    }

    #[test]
    fn build_rejects_missing_dependency() {
        let err = ResourceGraph::build(vec![resource("file", "file1", &["nonexistent.resource"])])
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingDependency { .. }));
        assert!(err.to_string().contains("nonexistent.resource"));
    }

    #[test]
    fn topo_sort_puts_dependencies_first() {
        let graph = ResourceGraph::build(vec![
            resource("service", "service1", &["file.file2"]),
            resource("file", "file2", &["file.file1"]),
            resource("file", "file1", &[]),
        ])
        .unwrap();

        assert_eq!(names_in_order(&graph), ["file1", "file2", "service1"]);
    }

    #[test]
    fn topo_sort_diamond_keeps_shared_dependency_first() {
        let graph = ResourceGraph::build(vec![
            resource("file", "top", &["file.left", "file.right"]),
            resource("file", "left", &["file.base"]),
            resource("file", "right", &["file.base"]),
            resource("file", "base", &[]),
        ])
        .unwrap();

        let order = names_in_order(&graph);
        assert_eq!(order[0], "base");
        assert_eq!(order[3], "top");
    }

    #[test]
    fn topo_sort_is_deterministic_for_siblings() {
        let build = || {
            ResourceGraph::build(vec![
                resource("file", "c", &[]),
                resource("file", "a", &[]),
                resource("file", "b", &[]),
            ])
            .unwrap()
        };
        // Independent siblings come out in sorted key order.
        assert_eq!(names_in_order(&build()), ["a", "b", "c"]);
        assert_eq!(names_in_order(&build()), ["a", "b", "c"]);
    }

    #[test]
    fn topo_sort_detects_two_node_cycle() {
        let graph = ResourceGraph::build(vec![
            resource("file", "a", &["file.b"]),
            resource("file", "b", &["file.a"]),
        ])
        .unwrap();

        let err = graph.topo_sort().unwrap_err();
        assert!(matches!(err, EngineError::DependencyCycle(_)));
        let message = err.to_string();
        assert!(
            message.contains("file.a") || message.contains("file.b"),
            "cycle error should name a resource on the cycle: {message}"
        );
    }

    #[test]
    fn topo_sort_detects_self_cycle() {
        let graph =
            ResourceGraph::build(vec![resource("file", "a", &["file.a"])]).unwrap();
        let err = graph.topo_sort().unwrap_err();
        assert!(err.to_string().contains("file.a"));
    }

    #[test]
    fn empty_graph_sorts_to_nothing() {
        let graph = ResourceGraph::build(Vec::new()).unwrap();
        assert!(graph.topo_sort().unwrap().is_empty());
    }
}
