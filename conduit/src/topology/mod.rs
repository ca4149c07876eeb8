//! Execution topology derived from a pipeline definition.
//!
//! Steps declare the single step they read from. The builder inverts those
//! input references into an output map, keeps only what is reachable from the
//! root step, and emits the resulting vertices and edges.

mod builder;
mod graph;

pub use builder::build_topology;
pub use graph::{Edge, TopologyGraph, Vertex};
