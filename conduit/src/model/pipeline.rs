//! Pipeline definitions.

use super::Step;
use crate::errors::TopologyError;
use crate::topology::{build_topology, TopologyGraph};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A named map of steps loaded from the ledger.
///
/// Keys are step names. Steps are immutable once a pipeline is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline identifier.
    #[serde(rename = "pipeline_id")]
    pub id: Uuid,
    /// Human readable pipeline name.
    pub name: String,
    /// Steps keyed by name.
    #[serde(default)]
    pub steps: HashMap<String, Step>,
}

impl Pipeline {
    /// Creates an empty pipeline with a fresh identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            steps: HashMap::new(),
        }
    }

    /// Sets the pipeline identifier.
    #[must_use]
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Adds a step keyed by its name.
    ///
    /// A step with the same name replaces the previous one.
    #[must_use]
    pub fn with_step(mut self, mut step: Step) -> Self {
        step.pipeline_id = self.id;
        self.steps.insert(step.name.clone(), step);
        self
    }

    /// Parses a pipeline definition from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid pipeline definition.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Returns the number of declared steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }

    /// Returns a step by identifier.
    #[must_use]
    pub fn step_by_id(&self, id: Uuid) -> Option<&Step> {
        self.steps.values().find(|step| step.id == id)
    }

    /// Returns the first step declaring an empty input.
    #[must_use]
    pub fn root_step(&self) -> Option<&Step> {
        self.steps.values().find(|step| step.is_root())
    }

    /// Derives the executable topology.
    ///
    /// # Errors
    ///
    /// Returns [`TopologyError::NoRoot`] when no step has an empty input, or
    /// [`TopologyError::Cycle`] when input references loop.
    pub fn topology(&self) -> Result<TopologyGraph, TopologyError> {
        build_topology(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_step_keys_by_name() {
        let pipeline = Pipeline::new("etl")
            .with_step(Step::new("input", ""))
            .with_step(Step::new("load", "input"));

        assert_eq!(pipeline.step_count(), 2);
        assert_eq!(pipeline.step("load").unwrap().input, "input");
        assert_eq!(pipeline.step("load").unwrap().pipeline_id, pipeline.id);
        assert_eq!(pipeline.root_step().unwrap().name, "input");
    }

    #[test]
    fn test_step_by_id() {
        let load = Step::new("load", "input");
        let id = load.id;
        let pipeline = Pipeline::new("etl").with_step(load);

        assert_eq!(pipeline.step_by_id(id).unwrap().name, "load");
        assert!(pipeline.step_by_id(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_from_json() {
        let text = r#"{
            "pipeline_id": "148fd0b6-f51f-4a95-b904-41a59dfcb62b",
            "name": "csv_to_pg",
            "steps": {
                "input": {
                    "step_id": "84225863-da7a-4b44-bb6a-bd3e3f801682",
                    "name": "input",
                    "input_step_name": null,
                    "image": "workers/csvreader"
                },
                "extract": {
                    "step_id": "84225863-da7a-4b44-bb6a-bd3e3f801683",
                    "name": "extract",
                    "input_step_name": "input",
                    "runtime_config": {"max_retries": 2}
                }
            }
        }"#;

        let pipeline = Pipeline::from_json(text).unwrap();
        assert_eq!(pipeline.name, "csv_to_pg");
        assert_eq!(pipeline.step_count(), 2);
        assert_eq!(pipeline.root_step().unwrap().name, "input");
        assert_eq!(pipeline.step("extract").unwrap().runtime_config.max_retries, 2);
    }

    #[test]
    fn test_no_root() {
        let pipeline = Pipeline::new("etl").with_step(Step::new("load", "extract"));
        assert!(pipeline.root_step().is_none());
        assert_eq!(pipeline.topology().unwrap_err(), TopologyError::NoRoot);
    }
}
