//! Batches, attempts, and retry accounting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One unit of work travelling along an edge of the topology.
///
/// Created before its first request is published and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Batch identifier.
    pub batch_id: Uuid,
    /// Step that produced the input. `None` for batches entering the root.
    pub step_from_id: Option<Uuid>,
    /// Step the batch is delivered to.
    pub step_to_id: Uuid,
    /// When the batch was created.
    pub issued_at: DateTime<Utc>,
    /// Input location of the request. Empty for batches entering the root.
    pub uri: String,
}

impl Batch {
    /// Creates a batch with a fresh identifier issued now.
    #[must_use]
    pub fn new(step_from_id: Option<Uuid>, step_to_id: Uuid, uri: impl Into<String>) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            step_from_id,
            step_to_id,
            issued_at: Utc::now(),
            uri: uri.into(),
        }
    }

    /// Returns true if the batch entered the pipeline at the root.
    #[must_use]
    pub fn is_origin(&self) -> bool {
        self.step_from_id.is_none()
    }
}

/// Terminal state of a batch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptState {
    /// The worker produced a result.
    #[serde(rename = "OK")]
    Ok,
    /// The worker reported an error.
    #[serde(rename = "ERROR")]
    Error,
}

impl AttemptState {
    /// Returns the persisted representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delivery of a batch, keyed by its correlation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAttempt {
    /// The batch being delivered.
    pub batch_id: Uuid,
    /// Correlates the outbound request with its response.
    pub correlation_id: Uuid,
    /// When the request was issued.
    pub started_at: DateTime<Utc>,
    /// When the response was recorded.
    pub finished_at: Option<DateTime<Utc>>,
    /// Outcome, once known.
    pub state: Option<AttemptState>,
    /// Error reported by the worker, empty on success.
    #[serde(default)]
    pub error: String,
}

impl BatchAttempt {
    /// Creates a pending attempt started now.
    #[must_use]
    pub fn new(batch_id: Uuid, correlation_id: Uuid) -> Self {
        Self {
            batch_id,
            correlation_id,
            started_at: Utc::now(),
            finished_at: None,
            state: None,
            error: String::new(),
        }
    }

    /// Records the outcome.
    pub fn finish(&mut self, state: AttemptState, error: impl Into<String>) {
        self.finished_at = Some(Utc::now());
        self.state = Some(state);
        self.error = error.into();
    }

    /// Returns true while no response has been recorded.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.is_none()
    }
}

/// Attempts made so far against the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    /// Configured maximum attempts for the destination step.
    pub max_retries: u32,
    /// Attempts recorded for the batch, including the first delivery.
    pub attempts: u32,
}

impl RetryBudget {
    /// Creates a retry budget.
    #[must_use]
    pub fn new(max_retries: u32, attempts: u32) -> Self {
        Self {
            max_retries,
            attempts,
        }
    }

    /// Returns true when no further attempt may be made.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }

    /// Attempts still available.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.max_retries.saturating_sub(self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_batch() {
        let batch = Batch::new(None, Uuid::new_v4(), "");
        assert!(batch.is_origin());
        assert!(!Batch::new(Some(Uuid::new_v4()), Uuid::new_v4(), "s3://b/x").is_origin());
    }

    #[test]
    fn test_attempt_finish() {
        let mut attempt = BatchAttempt::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(attempt.is_pending());

        attempt.finish(AttemptState::Error, "boom");
        assert!(!attempt.is_pending());
        assert_eq!(attempt.state, Some(AttemptState::Error));
        assert_eq!(attempt.error, "boom");
        assert!(attempt.finished_at.is_some());
    }

    #[test]
    fn test_attempt_state_repr() {
        assert_eq!(AttemptState::Ok.to_string(), "OK");
        assert_eq!(serde_json::to_string(&AttemptState::Error).unwrap(), "\"ERROR\"");
    }

    #[test]
    fn test_retry_budget() {
        assert!(!RetryBudget::new(3, 0).is_exhausted());
        assert!(!RetryBudget::new(3, 2).is_exhausted());
        assert!(RetryBudget::new(3, 3).is_exhausted());
        assert!(RetryBudget::new(0, 1).is_exhausted());
        assert_eq!(RetryBudget::new(3, 1).remaining(), 2);
        assert_eq!(RetryBudget::new(1, 4).remaining(), 0);
    }
}
