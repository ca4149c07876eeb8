//! Testing utilities for conduit pipelines.
//!
//! This module provides:
//! - Pipeline fixtures
//! - A scripted worker speaking the wire protocol over the in-memory broker

mod fixtures;
mod worker;

pub use fixtures::{fan_out_pipeline, pipeline_from_inputs, three_step_pipeline};
pub use worker::{ScriptedReply, ScriptedWorker};
