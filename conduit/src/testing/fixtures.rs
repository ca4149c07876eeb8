//! Pipeline fixtures.

use crate::model::{Pipeline, Step};

/// Builds a pipeline from `(step name, input name)` pairs.
///
/// An empty input name marks the root.
#[must_use]
pub fn pipeline_from_inputs(steps: &[(&str, &str)]) -> Pipeline {
    steps
        .iter()
        .fold(Pipeline::new("fixture"), |pipeline, (name, input)| {
            pipeline.with_step(Step::new(*name, *input))
        })
}

/// `input -> step1 -> step2`, every step allowing `max_retries` attempts.
#[must_use]
pub fn three_step_pipeline(max_retries: u32) -> Pipeline {
    Pipeline::new("three_step")
        .with_step(Step::new("input", "").with_image("workers/csvreader").with_max_retries(max_retries))
        .with_step(Step::new("step1", "input").with_image("workers/extractor").with_max_retries(max_retries))
        .with_step(Step::new("step2", "step1").with_image("workers/pgsqlcopysink").with_max_retries(max_retries))
}

/// `input -> {left, right}`, every step allowing three attempts.
#[must_use]
pub fn fan_out_pipeline() -> Pipeline {
    Pipeline::new("fan_out")
        .with_step(Step::new("input", "").with_max_retries(3))
        .with_step(Step::new("left", "input").with_max_retries(3))
        .with_step(Step::new("right", "input").with_max_retries(3))
}
