//! Engine lifecycle events.
//!
//! Events complement `tracing` logs with a stable, machine-readable record of
//! what each node did. They carry no control flow: a sink can never stop or
//! slow a node beyond its own `emit` latency.

mod sink;

pub use sink::{EventSink, LoggingEventSink, NoOpEventSink, RecordingEventSink};

/// Event names emitted by the executor.
pub mod kinds {
    /// A run declared its channels and is starting node loops.
    pub const RUN_STARTED: &str = "run.started";
    /// Every node loop of a run has ended.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A node loop started consuming.
    pub const NODE_STARTED: &str = "node.started";
    /// A node loop ended because its response stream closed.
    pub const NODE_COMPLETED: &str = "node.completed";
    /// A node loop ended with an error.
    pub const NODE_FAILED: &str = "node.failed";
    /// A node loop ended because the run was cancelled.
    pub const NODE_CANCELLED: &str = "node.cancelled";
    /// The root originated a new batch.
    pub const BATCH_PUMPED: &str = "batch.pumped";
    /// A successful result was forwarded to a successor.
    pub const BATCH_ADVANCED: &str = "batch.advanced";
    /// A failed attempt was retried.
    pub const ATTEMPT_RETRIED: &str = "attempt.retried";
    /// A lineage stopped because its retries ran out.
    pub const LINEAGE_EXHAUSTED: &str = "lineage.exhausted";
    /// A batch was discarded after an exhaustion signal.
    pub const BATCH_DISCARDED: &str = "batch.discarded";
    /// An undecodable response was rejected.
    pub const MESSAGE_REJECTED: &str = "message.rejected";
}
