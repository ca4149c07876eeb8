//! Pipeline definitions and lineage records.
//!
//! This module provides:
//! - Steps and their runtime policy
//! - Pipelines as named step maps
//! - Batches and batch attempts tracked by the ledger

mod batch;
mod pipeline;
mod step;

pub use batch::{AttemptState, Batch, BatchAttempt, RetryBudget};
pub use pipeline::Pipeline;
pub use step::{RuntimeConfig, Step};
