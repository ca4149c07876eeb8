//! Topology graph types.

use crate::model::Step;

/// A reachable step together with its name in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    /// Step name (the key in the pipeline step map).
    pub name: String,
    /// The step definition.
    pub step: Step,
}

impl Vertex {
    /// Creates a vertex.
    #[must_use]
    pub fn new(name: impl Into<String>, step: Step) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }
}

/// A directed edge between two step names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The producing step.
    pub from: String,
    /// The consuming step.
    pub to: String,
}

impl Edge {
    /// Creates an edge.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The pruned, reachable-only view of a pipeline.
///
/// Vertex and edge order is an implementation detail; only membership is
/// meaningful.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl TopologyGraph {
    /// Creates a graph from its parts.
    #[must_use]
    pub fn new(vertices: Vec<Vertex>, edges: Vec<Edge>) -> Self {
        Self { vertices, edges }
    }

    /// Returns all vertices.
    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Returns all edges.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Returns true if the graph has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Returns a vertex by step name.
    #[must_use]
    pub fn vertex(&self, name: &str) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.name == name)
    }

    /// Returns true if the named step is part of the topology.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.vertex(name).is_some()
    }

    /// Returns the vertices fed directly by the named step.
    pub fn successors<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Vertex> + 'a {
        self.edges
            .iter()
            .filter(move |edge| edge.from == name)
            .filter_map(move |edge| self.vertex(&edge.to))
    }

    /// Returns the vertex of the root step.
    #[must_use]
    pub fn root(&self) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.step.is_root())
    }
}
