//! Channel wiring.
//!
//! Every topology vertex gets a [`ChannelPair`]: the request channel the engine
//! publishes to, the response channel its worker answers on, and the indices
//! of the pairs directly downstream. Pairs live in one arena owned by
//! [`ChannelWiring`] and refer to each other by index.

use crate::errors::TopologyError;
use crate::model::Step;
use crate::topology::{TopologyGraph, Vertex};
use std::collections::HashMap;
use uuid::Uuid;

/// Channel names and successor links for one topology vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPair {
    /// The vertex this pair serves.
    pub vertex: Vertex,
    /// Channel the engine publishes requests on.
    pub request: String,
    /// Channel the engine consumes responses from.
    pub response: String,
    /// Arena indices of the direct successors. `None` for terminal pairs.
    pub next: Option<Vec<usize>>,
}

impl ChannelPair {
    fn new(vertex: Vertex) -> Self {
        Self {
            request: vertex.step.request_channel(),
            response: vertex.step.response_channel(),
            vertex,
            next: None,
        }
    }

    /// The step served by this pair.
    #[must_use]
    pub fn step(&self) -> &Step {
        &self.vertex.step
    }

    /// The step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.vertex.name
    }

    /// Returns true if no step consumes this step's output.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next.is_none()
    }

    /// Returns true if this pair serves the root step.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.vertex.step.is_root()
    }
}

/// The wired topology: an arena of channel pairs.
#[derive(Debug, Clone)]
pub struct ChannelWiring {
    pairs: Vec<ChannelPair>,
    root: usize,
}

impl ChannelWiring {
    /// Wires every vertex of a graph.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NoRoot`] if no vertex holds the root step.
    /// Graphs produced by [`build_topology`](crate::topology::build_topology)
    /// always have one.
    pub fn from_graph(graph: &TopologyGraph) -> Result<Self, TopologyError> {
        let mut pairs: Vec<ChannelPair> = graph
            .vertices()
            .iter()
            .cloned()
            .map(ChannelPair::new)
            .collect();

        let index: HashMap<&str, usize> = graph
            .vertices()
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.as_str(), i))
            .collect();

        for edge in graph.edges() {
            let (Some(&from), Some(&to)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str()))
            else {
                continue;
            };
            let next = pairs[from].next.get_or_insert_with(Vec::new);
            if !next.contains(&to) {
                next.push(to);
            }
        }

        let root = pairs
            .iter()
            .position(ChannelPair::is_root)
            .ok_or(TopologyError::NoRoot)?;

        Ok(Self { pairs, root })
    }

    /// Returns all pairs in arena order.
    #[must_use]
    pub fn pairs(&self) -> &[ChannelPair] {
        &self.pairs
    }

    /// Returns the pair at an arena index.
    #[must_use]
    pub fn pair(&self, index: usize) -> Option<&ChannelPair> {
        self.pairs.get(index)
    }

    /// Returns the root pair.
    #[must_use]
    pub fn root(&self) -> &ChannelPair {
        &self.pairs[self.root]
    }

    /// Returns the arena index of the root pair.
    #[must_use]
    pub fn root_index(&self) -> usize {
        self.root
    }

    /// Returns the direct successors of a pair.
    pub fn successors(&self, index: usize) -> impl Iterator<Item = &ChannelPair> + '_ {
        self.pairs
            .get(index)
            .and_then(|pair| pair.next.as_deref())
            .unwrap_or_default()
            .iter()
            .filter_map(move |&i| self.pairs.get(i))
    }

    /// Returns the arena index of a step by name.
    #[must_use]
    pub fn index_of(&self, step_name: &str) -> Option<usize> {
        self.pairs.iter().position(|p| p.vertex.name == step_name)
    }

    /// Returns the arena index of a step by identifier.
    #[must_use]
    pub fn find_by_step_id(&self, step_id: Uuid) -> Option<usize> {
        self.pairs.iter().position(|p| p.vertex.step.id == step_id)
    }

    /// Resolves where a failed batch destined for `step_id` is resent.
    ///
    /// Only the pair at `index` and its direct successors are candidates.
    #[must_use]
    pub fn retry_target(&self, index: usize, step_id: Uuid) -> Option<&ChannelPair> {
        let pair = self.pairs.get(index)?;
        if pair.vertex.step.id == step_id {
            return Some(pair);
        }
        self.successors(index).find(|p| p.vertex.step.id == step_id)
    }

    /// Every channel name, request then response, pair by pair.
    #[must_use]
    pub fn channel_names(&self) -> Vec<&str> {
        self.pairs
            .iter()
            .flat_map(|p| [p.request.as_str(), p.response.as_str()])
            .collect()
    }

    /// Number of pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Returns true if there are no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Wires a topology graph into channel pairs.
///
/// # Errors
///
/// See [`ChannelWiring::from_graph`].
pub fn wire_channels(graph: &TopologyGraph) -> Result<ChannelWiring, TopologyError> {
    ChannelWiring::from_graph(graph)
}
