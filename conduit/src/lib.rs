//! # Conduit
//!
//! An execution engine for pipelines whose steps run as external workers
//! connected through a message broker.
//!
//! A [`Pipeline`](model::Pipeline) names its steps and the step each one
//! reads from. Conduit:
//!
//! - **Builds the topology**: keeps only steps reachable from the root and
//!   rejects cycles
//! - **Wires channels**: gives every vertex a request/response channel pair
//! - **Runs the engine**: one loop per pair consumes worker responses,
//!   records attempts in a [`BatchLedger`](ledger::BatchLedger) and pushes
//!   new requests downstream, retrying failed attempts within each step's
//!   retry budget
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::prelude::*;
//! use std::sync::Arc;
//!
//! let pipeline = Pipeline::new("ingest")
//!     .with_step(Step::new("input", "").with_image("workers/csvreader"))
//!     .with_step(Step::new("load", "input").with_image("workers/pgsqlcopysink"));
//!
//! let ledger = Arc::new(InMemoryLedger::with_pipeline(pipeline.clone()));
//! let transport = Arc::new(InMemoryTransport::new());
//! let config = EngineConfig::new("s3://results");
//!
//! let executor = PipelineExecutor::new(pipeline, ledger, transport, config)?;
//! let report = executor.run().await?;
//! report.into_result()?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod model;
pub mod observability;
pub mod rpc;
pub mod testing;
pub mod topology;
pub mod transport;
pub mod wiring;

pub use engine::{EngineConfig, PipelineExecutor, RunReport};
pub use errors::ConduitError;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::engine::{
        EngineConfig, ExhaustedRetryPolicy, NodeOutcome, NodeReport, NodeStats,
        PipelineExecutor, ResultLocator, RunReport,
    };
    pub use crate::errors::{
        ConduitError, EngineError, LedgerError, NodeFailure, TopologyError,
        TransportError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::ledger::{BatchLedger, InMemoryLedger};
    pub use crate::model::{AttemptState, Batch, BatchAttempt, Pipeline, RetryBudget, Step};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::rpc::{ProcessRequest, ProcessResponse, ProcessStatus};
    pub use crate::topology::{build_topology, TopologyGraph};
    pub use crate::transport::{InMemoryTransport, Transport};
    pub use crate::wiring::{wire_channels, ChannelPair, ChannelWiring};
}
