//! Error types for the conduit engine.
//!
//! Each collaborator gets its own error enum so failures can be attributed to
//! the component that produced them. [`ConduitError`] aggregates them at the
//! crate boundary.

use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for conduit operations.
#[derive(Debug, Error)]
pub enum ConduitError {
    /// The pipeline definition could not be turned into a topology.
    #[error("{0}")]
    Topology(#[from] TopologyError),

    /// A channel could not be declared or purged during startup.
    #[error("Channel setup failed for '{channel}': {source}")]
    ChannelSetup {
        /// The channel being declared.
        channel: String,
        /// The underlying transport error.
        #[source]
        source: TransportError,
    },

    /// A ledger call made outside of a node loop failed.
    #[error("{0}")]
    Ledger(#[from] LedgerError),

    /// One or more node loops terminated with an error.
    #[error("{} node(s) failed: {}", .0.len(), summarize_failures(.0))]
    NodesFailed(Vec<NodeFailure>),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn summarize_failures(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.step_name, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A node loop that ended with an error.
#[derive(Debug)]
pub struct NodeFailure {
    /// The step name of the failed node.
    pub step_name: String,
    /// The step identifier of the failed node.
    pub step_id: Uuid,
    /// Why the node stopped.
    pub error: EngineError,
}

/// Errors raised while deriving the execution topology.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// No step declares an empty input.
    #[error("topology does not have input")]
    NoRoot,

    /// The input references of some steps form a cycle.
    ///
    /// Each step has a single input, so a loop can never hang off the root:
    /// the steps in it are orphans that traversal would drop anyway. The
    /// check rejects the whole pipeline instead of dropping them silently.
    #[error("Cycle detected in pipeline: {}", path.join(" -> "))]
    Cycle {
        /// The step names forming the cycle, first name repeated at the end.
        path: Vec<String>,
    },
}

/// Errors raised by a [`BatchLedger`](crate::ledger::BatchLedger).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// A row the engine expected to exist is missing.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// The kind of record (batch, attempt, pipeline, step).
        entity: &'static str,
        /// The key that was looked up.
        key: String,
    },

    /// The storage backend reported a failure.
    #[error("Ledger backend error: {0}")]
    Backend(String),

    /// A failure injected for testing.
    #[error("Injected ledger failure in {0}")]
    Injected(String),
}

impl LedgerError {
    /// Creates a not-found error.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// Errors raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The channel was never declared.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// The channel has been closed and accepts no more traffic.
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// The broker reported a failure.
    #[error("Broker error: {0}")]
    Broker(String),

    /// A failure injected for testing.
    #[error("Injected transport failure on {0}")]
    Injected(String),
}

/// Errors raised while encoding or decoding wire records.
#[derive(Debug, Error)]
#[error("Codec error: {0}")]
pub struct CodecError(#[from] serde_json::Error);

/// Errors that terminate a single node loop.
///
/// Collaborator errors are carried unchanged. The two lookup variants are the
/// only engine-specific wrappers: they tell a retry-count failure apart from a
/// resource-location failure on the retry path.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A ledger call failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A transport call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The retry budget of a failed attempt could not be read.
    #[error("Retry budget lookup failed for {correlation_id}: {source}")]
    RetryBudgetLookup {
        /// The failed attempt.
        correlation_id: Uuid,
        /// The underlying ledger error.
        #[source]
        source: LedgerError,
    },

    /// The original resource location of a failed attempt could not be read.
    #[error("Resource lookup failed for {correlation_id}: {source}")]
    ResourceLookup {
        /// The failed attempt.
        correlation_id: Uuid,
        /// The underlying ledger error.
        #[source]
        source: LedgerError,
    },

    /// No response arrived on a channel within the configured idle timeout.
    #[error("No response on '{channel}' within {timeout:?}")]
    ResponseTimeout {
        /// The response channel.
        channel: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// The node task panicked.
    #[error("Node task panicked: {0}")]
    Panicked(String),
}

impl EngineError {
    /// Returns true if the error came from the retry path lookups.
    #[must_use]
    pub fn is_retry_lookup(&self) -> bool {
        matches!(
            self,
            Self::RetryBudgetLookup { .. } | Self::ResourceLookup { .. }
        )
    }
}
