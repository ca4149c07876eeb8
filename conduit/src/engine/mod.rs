//! Event-driven execution engine.
//!
//! [`PipelineExecutor`] owns one control loop per channel pair. Every loop
//! consumes its pair's response channel and reacts to each response:
//!
//! - a success is recorded and forwarded to every successor as a new batch,
//! - a failure is recorded and, while the batch has attempts left, resent with
//!   the batch's original input,
//! - an exhaustion signal discards the batch.
//!
//! The root loop also originates work: one request before it starts
//! consuming and one more after every response until it sees `ALLDONE`.

mod config;
mod executor;
mod locator;
mod processing;
mod report;


pub use config::{EngineConfig, ExhaustedRetryPolicy};
pub use executor::PipelineExecutor;
pub use locator::ResultLocator;
pub use report::{NodeOutcome, NodeReport, NodeStats, RunReport};
