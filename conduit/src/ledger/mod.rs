//! Batch ledger: lineage, attempt and retry bookkeeping.
//!
//! The engine calls the ledger inline from its node loops. Implementations
//! must make single-record mutations atomic; the engine never takes locks of
//! its own and never runs two attempts of one batch concurrently.

mod memory;

pub use memory::{InMemoryLedger, LedgerOperation};

use crate::errors::LedgerError;
use crate::model::{AttemptState, Batch, Pipeline, RetryBudget};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence operations the execution engine depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BatchLedger: Send + Sync {
    /// Returns the attempts recorded for the batch owning `correlation_id`
    /// together with the destination step's configured maximum.
    async fn retry_budget(&self, correlation_id: Uuid) -> Result<RetryBudget, LedgerError>;

    /// Returns the input location of the batch owning `correlation_id`.
    async fn original_resource_uri(&self, correlation_id: Uuid) -> Result<String, LedgerError>;

    /// Records a new batch.
    async fn create_batch(
        &self,
        step_from_id: Option<Uuid>,
        step_to_id: Uuid,
        uri: &str,
    ) -> Result<Batch, LedgerError>;

    /// Records a pending attempt of a batch.
    async fn create_attempt(&self, batch_id: Uuid, correlation_id: Uuid) -> Result<(), LedgerError>;

    /// Records the outcome of an attempt.
    async fn set_attempt_outcome(
        &self,
        correlation_id: Uuid,
        state: AttemptState,
        error: &str,
    ) -> Result<(), LedgerError>;

    /// Returns the batch owning `correlation_id`.
    async fn batch_by_correlation_id(&self, correlation_id: Uuid) -> Result<Batch, LedgerError>;

    /// Deletes the batch owning `correlation_id` and all of its attempts.
    async fn discard_batch(&self, correlation_id: Uuid) -> Result<(), LedgerError>;

    /// Loads a pipeline definition.
    async fn pipeline_by_id(&self, pipeline_id: Uuid) -> Result<Pipeline, LedgerError>;
}
