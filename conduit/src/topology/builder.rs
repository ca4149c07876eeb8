//! Topology construction.

use super::{Edge, TopologyGraph, Vertex};
use crate::errors::TopologyError;
use crate::model::Pipeline;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Key of the synthetic root in the output map: the input name of the root step.
const ROOT_KEY: &str = "";

/// Builds the executable topology of a pipeline.
///
/// Steps whose input chain does not lead back to the root step are dropped
/// silently, together with everything downstream of them.
///
/// # Errors
///
/// Returns [`TopologyError::NoRoot`] when no step declares an empty input and
/// [`TopologyError::Cycle`] when input references form a loop.
pub fn build_topology(pipeline: &Pipeline) -> Result<TopologyGraph, TopologyError> {
    let mut outputs = output_map(pipeline);
    let visited = reachable_from_root(&outputs)?;
    detect_cycles(pipeline)?;
    prune(&mut outputs, &visited);

    let mut vertices = Vec::new();
    let mut edges = Vec::new();
    let mut queue = VecDeque::from([ROOT_KEY]);

    while let Some(node) = queue.pop_front() {
        let Some(children) = outputs.get(node) else {
            continue;
        };
        for child in children {
            let Some(step) = pipeline.steps.get(child) else {
                continue;
            };
            vertices.push(Vertex::new(child.as_str(), step.clone()));
            if node != ROOT_KEY {
                edges.push(Edge::new(node, child.as_str()));
            }
            queue.push_back(child.as_str());
        }
    }

    let dropped = pipeline.steps.len().saturating_sub(vertices.len());
    if dropped > 0 {
        debug!(
            pipeline = %pipeline.name,
            dropped,
            "Dropped steps unreachable from the root"
        );
    }

    Ok(TopologyGraph::new(vertices, edges))
}

/// Inverts input references into `input name -> [consumer names]`.
fn output_map(pipeline: &Pipeline) -> HashMap<String, Vec<String>> {
    let mut outputs: HashMap<String, Vec<String>> = HashMap::new();
    for (name, step) in &pipeline.steps {
        outputs
            .entry(step.input.clone())
            .or_default()
            .push(name.clone());
    }
    for consumers in outputs.values_mut() {
        consumers.sort();
    }
    outputs
}

/// Worklist traversal from the root key.
fn reachable_from_root(
    outputs: &HashMap<String, Vec<String>>,
) -> Result<HashSet<String>, TopologyError> {
    if !outputs.contains_key(ROOT_KEY) {
        return Err(TopologyError::NoRoot);
    }

    let mut visited = HashSet::from([ROOT_KEY.to_string()]);
    let mut stack = vec![ROOT_KEY];

    while let Some(node) = stack.pop() {
        for child in outputs.get(node).into_iter().flatten() {
            if visited.insert(child.clone()) {
                stack.push(child.as_str());
            }
        }
    }

    Ok(visited)
}

fn prune(outputs: &mut HashMap<String, Vec<String>>, visited: &HashSet<String>) {
    outputs.retain(|key, _| visited.contains(key));
}

/// Follows every step's input chain looking for a loop.
fn detect_cycles(pipeline: &Pipeline) -> Result<(), TopologyError> {
    let mut settled: HashSet<&str> = HashSet::new();
    let mut names: Vec<&str> = pipeline.steps.keys().map(String::as_str).collect();
    names.sort_unstable();

    for name in names {
        let mut path: Vec<&str> = Vec::new();
        let mut current = name;

        while let Some(step) = pipeline.steps.get(current) {
            if settled.contains(current) {
                break;
            }
            if let Some(start) = path.iter().position(|n| *n == current) {
                let mut cycle: Vec<String> = path[start..].iter().map(|n| (*n).to_string()).collect();
                cycle.push(current.to_string());
                return Err(TopologyError::Cycle { path: cycle });
            }
            path.push(current);
            current = step.input.as_str();
        }

        settled.extend(path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Step;
    use crate::testing::pipeline_from_inputs;
    use pretty_assertions::assert_eq;

    fn branching_pipeline() -> Pipeline {
        pipeline_from_inputs(&[
            ("input", ""),
            ("step1", "input"),
            ("step2", "step1"),
            ("step3", "step2"),
            ("step4", "input"),
            ("step5", "step4"),
            ("step6", "step7"),
        ])
    }

    fn names(graph: &TopologyGraph) -> HashSet<String> {
        graph.vertices().iter().map(|v| v.name.clone()).collect()
    }

    fn edge_set(graph: &TopologyGraph) -> HashSet<Edge> {
        graph.edges().iter().cloned().collect()
    }

    #[test]
    fn test_output_map_inverts_inputs() {
        let outputs = output_map(&branching_pipeline());

        assert_eq!(outputs[""], vec!["input"]);
        assert_eq!(outputs["input"], vec!["step1", "step4"]);
        assert_eq!(outputs["step1"], vec!["step2"]);
        assert_eq!(outputs["step2"], vec!["step3"]);
        assert_eq!(outputs["step4"], vec!["step5"]);
        assert_eq!(outputs["step7"], vec!["step6"]);
        assert_eq!(outputs.len(), 6);
    }

    #[test]
    fn test_traverse_without_root() {
        let pipeline = pipeline_from_inputs(&[
            ("input", "step0"),
            ("step1", "input"),
            ("step6", "step7"),
        ]);
        let outputs = output_map(&pipeline);

        assert_eq!(reachable_from_root(&outputs), Err(TopologyError::NoRoot));
    }

    #[test]
    fn test_traverse_reaches_chain() {
        let pipeline = pipeline_from_inputs(&[
            ("input", ""),
            ("step1", "input"),
            ("step2", "step1"),
            ("step3", "step2"),
            ("step4", "step3"),
            ("step5", "step4"),
            ("step6", "step7"),
        ]);
        let visited = reachable_from_root(&output_map(&pipeline)).unwrap();

        let expected: HashSet<String> = ["", "input", "step1", "step2", "step3", "step4", "step5"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn test_prune_drops_unreachable_keys() {
        let mut outputs = output_map(&branching_pipeline());
        let visited = reachable_from_root(&outputs).unwrap();
        prune(&mut outputs, &visited);

        assert!(!outputs.contains_key("step7"));
        assert_eq!(outputs.len(), 5);
    }

    #[test]
    fn test_build_topology() {
        let graph = build_topology(&branching_pipeline()).unwrap();

        let expected_names: HashSet<String> = ["input", "step1", "step2", "step3", "step4", "step5"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        assert_eq!(names(&graph), expected_names);
        assert_eq!(graph.len(), 6);

        let expected_edges: HashSet<Edge> = [
            Edge::new("input", "step1"),
            Edge::new("step1", "step2"),
            Edge::new("step2", "step3"),
            Edge::new("input", "step4"),
            Edge::new("step4", "step5"),
        ]
        .into_iter()
        .collect();
        assert_eq!(edge_set(&graph), expected_edges);
        assert_eq!(graph.edges().len(), 5);
    }

    #[test]
    fn test_orphan_branch_is_dropped() {
        let pipeline = pipeline_from_inputs(&[
            ("input", ""),
            ("step1", "input"),
            ("step2", "step1"),
            ("step6", "step7"),
        ]);
        let graph = build_topology(&pipeline).unwrap();

        assert!(!graph.contains("step6"));
        assert!(!graph.contains("step7"));
        assert!(graph.edges().iter().all(|e| e.from != "step7" && e.to != "step6"));
        assert!(graph.edges().contains(&Edge::new("input", "step1")));
        assert!(graph.edges().contains(&Edge::new("step1", "step2")));
    }

    #[test]
    fn test_orphan_descendants_are_dropped() {
        let pipeline = pipeline_from_inputs(&[
            ("input", ""),
            ("step6", "missing"),
            ("step7", "step6"),
            ("step8", "step7"),
        ]);
        let graph = build_topology(&pipeline).unwrap();

        assert_eq!(graph.len(), 1);
        assert!(graph.edges().is_empty());
        assert_eq!(graph.root().unwrap().name, "input");
    }

    #[test]
    fn test_every_step_appears_once_under_its_input() {
        let pipeline = branching_pipeline();
        let graph = build_topology(&pipeline).unwrap();

        for vertex in graph.vertices() {
            let count = graph.vertices().iter().filter(|v| v.name == vertex.name).count();
            assert_eq!(count, 1, "{} listed more than once", vertex.name);

            let incoming: Vec<&Edge> = graph.edges().iter().filter(|e| e.to == vertex.name).collect();
            if vertex.step.is_root() {
                assert!(incoming.is_empty());
            } else {
                assert_eq!(incoming.len(), 1);
                assert_eq!(incoming[0].from, vertex.step.input);
            }
        }
    }

    #[test]
    fn test_no_root_error() {
        let pipeline = pipeline_from_inputs(&[
            ("input", "step0"),
            ("step1", "input"),
            ("step2", "step1"),
        ]);

        assert_eq!(build_topology(&pipeline).unwrap_err(), TopologyError::NoRoot);
    }

    #[test]
    fn test_empty_pipeline_has_no_root() {
        assert_eq!(
            build_topology(&Pipeline::new("empty")).unwrap_err(),
            TopologyError::NoRoot
        );
    }

    #[test]
    fn test_cycle_rejected() {
        // The loop hangs off no root, so only the cycle check sees it.
        let pipeline = pipeline_from_inputs(&[
            ("input", ""),
            ("a", "c"),
            ("b", "a"),
            ("c", "b"),
        ]);

        match build_topology(&pipeline) {
            Err(TopologyError::Cycle { path }) => {
                assert_eq!(path.first(), path.last());
                assert_eq!(path.len(), 4);
            }
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_rejected() {
        let pipeline = pipeline_from_inputs(&[("input", ""), ("loop", "loop")]);

        assert_eq!(
            build_topology(&pipeline).unwrap_err(),
            TopologyError::Cycle {
                path: vec!["loop".to_string(), "loop".to_string()]
            }
        );
    }

    #[test]
    fn test_vertices_carry_step_definitions() {
        let pipeline = Pipeline::new("etl")
            .with_step(Step::new("input", "").with_image("csvreader"))
            .with_step(Step::new("load", "input").with_max_retries(4));
        let graph = build_topology(&pipeline).unwrap();

        assert_eq!(graph.vertex("input").unwrap().step.image, "csvreader");
        assert_eq!(graph.vertex("load").unwrap().step.runtime_config.max_retries, 4);
        let successors: Vec<&str> = graph.successors("input").map(|v| v.name.as_str()).collect();
        assert_eq!(successors, vec!["load"]);
    }
}
