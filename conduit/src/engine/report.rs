//! Per-node and per-run reports.

use crate::errors::{ConduitError, EngineError, NodeFailure};
use std::time::Duration;
use uuid::Uuid;

/// How a node loop ended.
#[derive(Debug)]
pub enum NodeOutcome {
    /// The response stream closed.
    Completed,
    /// The run was cancelled.
    Cancelled,
    /// Processing a response failed, or no response arrived in time.
    Failed(EngineError),
    /// The node task panicked.
    Panicked(String),
}

impl NodeOutcome {
    /// Returns true for `Failed` and `Panicked`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::Panicked(_))
    }

    /// Short label used in logs and events.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed(_) => "failed",
            Self::Panicked(_) => "panicked",
        }
    }
}

/// Counters kept by one node loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Deliveries received, decodable or not.
    pub received: u64,
    /// Responses acknowledged after processing.
    pub acked: u64,
    /// Undecodable deliveries rejected.
    pub rejected: u64,
    /// Successful responses.
    pub succeeded: u64,
    /// Failed responses.
    pub failed: u64,
    /// Exhaustion signals.
    pub all_done: u64,
    /// Requests originated by the root.
    pub pumped: u64,
    /// Requests forwarded to successors.
    pub advanced: u64,
    /// Retry requests published.
    pub retried: u64,
    /// Batches that ran out of attempts, when reported.
    pub exhausted: Vec<Uuid>,
}

/// The result of one node loop.
#[derive(Debug)]
pub struct NodeReport {
    /// Step name.
    pub step_name: String,
    /// Step identifier.
    pub step_id: Uuid,
    /// How the loop ended.
    pub outcome: NodeOutcome,
    /// What the loop did.
    pub stats: NodeStats,
}

/// The result of [`PipelineExecutor::run`](super::PipelineExecutor::run).
#[derive(Debug, Default)]
pub struct RunReport {
    /// One report per node, in wiring order.
    pub nodes: Vec<NodeReport>,
    /// Wall time from the first spawned loop to the last report.
    pub elapsed: Duration,
}

impl RunReport {
    /// Report of a node by step name.
    #[must_use]
    pub fn node(&self, step_name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.step_name == step_name)
    }

    /// Nodes that failed or panicked.
    #[must_use]
    pub fn failures(&self) -> Vec<&NodeReport> {
        self.nodes.iter().filter(|n| n.outcome.is_failure()).collect()
    }

    /// Returns true if no node failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.nodes.iter().all(|n| !n.outcome.is_failure())
    }

    /// Collapses the report into a single result.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::NodesFailed`] listing every failed node.
    pub fn into_result(self) -> Result<Self, ConduitError> {
        if self.is_success() {
            return Ok(self);
        }
        let failures = self
            .nodes
            .into_iter()
            .filter_map(|node| {
                let error = match node.outcome {
                    NodeOutcome::Failed(error) => error,
                    NodeOutcome::Panicked(message) => EngineError::Panicked(message),
                    NodeOutcome::Completed | NodeOutcome::Cancelled => return None,
                };
                Some(NodeFailure {
                    step_name: node.step_name,
                    step_id: node.step_id,
                    error,
                })
            })
            .collect();
        Err(ConduitError::NodesFailed(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LedgerError;

    fn report(name: &str, outcome: NodeOutcome) -> NodeReport {
        NodeReport {
            step_name: name.to_string(),
            step_id: Uuid::new_v4(),
            outcome,
            stats: NodeStats::default(),
        }
    }

    #[test]
    fn test_success() {
        let run = RunReport {
            nodes: vec![
                report("input", NodeOutcome::Completed),
                report("load", NodeOutcome::Cancelled),
            ],
            elapsed: Duration::ZERO,
        };

        assert!(run.is_success());
        assert!(run.failures().is_empty());
        assert_eq!(run.node("load").unwrap().outcome.label(), "cancelled");
        assert!(run.into_result().is_ok());
    }

    #[test]
    fn test_failures_collapse_into_one_error() {
        let run = RunReport {
            nodes: vec![
                report("input", NodeOutcome::Completed),
                report(
                    "extract",
                    NodeOutcome::Failed(EngineError::Ledger(LedgerError::Backend("down".into()))),
                ),
                report("load", NodeOutcome::Panicked("boom".into())),
            ],
            elapsed: Duration::ZERO,
        };

        assert!(!run.is_success());
        assert_eq!(run.failures().len(), 2);

        match run.into_result() {
            Err(ConduitError::NodesFailed(failures)) => {
                let names: Vec<&str> = failures.iter().map(|f| f.step_name.as_str()).collect();
                assert_eq!(names, vec!["extract", "load"]);
                assert!(matches!(failures[1].error, EngineError::Panicked(_)));
            }
            other => panic!("expected NodesFailed, got {other:?}"),
        }
    }
}
