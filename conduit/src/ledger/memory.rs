//! In-memory ledger.

use super::BatchLedger;
use crate::errors::LedgerError;
use crate::model::{AttemptState, Batch, BatchAttempt, Pipeline, RetryBudget, Step};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

/// Ledger operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerOperation {
    /// [`BatchLedger::retry_budget`]
    RetryBudget,
    /// [`BatchLedger::original_resource_uri`]
    OriginalResourceUri,
    /// [`BatchLedger::create_batch`]
    CreateBatch,
    /// [`BatchLedger::create_attempt`]
    CreateAttempt,
    /// [`BatchLedger::set_attempt_outcome`]
    SetAttemptOutcome,
    /// [`BatchLedger::batch_by_correlation_id`]
    BatchByCorrelationId,
    /// [`BatchLedger::discard_batch`]
    DiscardBatch,
    /// [`BatchLedger::pipeline_by_id`]
    PipelineById,
}

impl fmt::Display for LedgerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RetryBudget => "retry_budget",
            Self::OriginalResourceUri => "original_resource_uri",
            Self::CreateBatch => "create_batch",
            Self::CreateAttempt => "create_attempt",
            Self::SetAttemptOutcome => "set_attempt_outcome",
            Self::BatchByCorrelationId => "batch_by_correlation_id",
            Self::DiscardBatch => "discard_batch",
            Self::PipelineById => "pipeline_by_id",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Default)]
struct LedgerState {
    pipelines: HashMap<Uuid, Pipeline>,
    batches: HashMap<Uuid, Batch>,
    attempts: HashMap<Uuid, BatchAttempt>,
    failing: HashSet<LedgerOperation>,
}

impl LedgerState {
    fn check(&self, op: LedgerOperation) -> Result<(), LedgerError> {
        if self.failing.contains(&op) {
            return Err(LedgerError::Injected(op.to_string()));
        }
        Ok(())
    }

    fn attempt(&self, correlation_id: Uuid) -> Result<&BatchAttempt, LedgerError> {
        self.attempts
            .get(&correlation_id)
            .ok_or_else(|| LedgerError::not_found("attempt", correlation_id))
    }

    fn batch_of(&self, correlation_id: Uuid) -> Result<&Batch, LedgerError> {
        let batch_id = self.attempt(correlation_id)?.batch_id;
        self.batches
            .get(&batch_id)
            .ok_or_else(|| LedgerError::not_found("batch", batch_id))
    }

    fn step(&self, step_id: Uuid) -> Result<&Step, LedgerError> {
        self.pipelines
            .values()
            .find_map(|p| p.step_by_id(step_id))
            .ok_or_else(|| LedgerError::not_found("step", step_id))
    }

    fn attempt_count(&self, batch_id: Uuid) -> usize {
        self.attempts.values().filter(|a| a.batch_id == batch_id).count()
    }
}

/// A [`BatchLedger`] held entirely in memory.
///
/// Retry maxima are read from the steps of registered pipelines, so register
/// the pipeline being executed before running it.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger holding one pipeline.
    #[must_use]
    pub fn with_pipeline(pipeline: Pipeline) -> Self {
        let ledger = Self::new();
        ledger.register_pipeline(pipeline);
        ledger
    }

    /// Stores a pipeline definition.
    pub fn register_pipeline(&self, pipeline: Pipeline) {
        self.state.lock().pipelines.insert(pipeline.id, pipeline);
    }

    /// Makes every subsequent call of `op` fail.
    pub fn fail_operation(&self, op: LedgerOperation) {
        self.state.lock().failing.insert(op);
    }

    /// Stops failing calls of `op`.
    pub fn clear_failure(&self, op: LedgerOperation) {
        self.state.lock().failing.remove(&op);
    }

    /// All batches, oldest first.
    #[must_use]
    pub fn batches(&self) -> Vec<Batch> {
        let mut batches: Vec<Batch> = self.state.lock().batches.values().cloned().collect();
        batches.sort_by_key(|b| b.issued_at);
        batches
    }

    /// A batch by identifier.
    #[must_use]
    pub fn batch(&self, batch_id: Uuid) -> Option<Batch> {
        self.state.lock().batches.get(&batch_id).cloned()
    }

    /// All attempts, oldest first.
    #[must_use]
    pub fn attempts(&self) -> Vec<BatchAttempt> {
        let mut attempts: Vec<BatchAttempt> = self.state.lock().attempts.values().cloned().collect();
        attempts.sort_by_key(|a| a.started_at);
        attempts
    }

    /// Attempts of one batch, oldest first.
    #[must_use]
    pub fn attempts_for_batch(&self, batch_id: Uuid) -> Vec<BatchAttempt> {
        let mut attempts: Vec<BatchAttempt> = self
            .state
            .lock()
            .attempts
            .values()
            .filter(|a| a.batch_id == batch_id)
            .cloned()
            .collect();
        attempts.sort_by_key(|a| a.started_at);
        attempts
    }

    /// An attempt by correlation id.
    #[must_use]
    pub fn attempt(&self, correlation_id: Uuid) -> Option<BatchAttempt> {
        self.state.lock().attempts.get(&correlation_id).cloned()
    }
}

#[async_trait]
impl BatchLedger for InMemoryLedger {
    async fn retry_budget(&self, correlation_id: Uuid) -> Result<RetryBudget, LedgerError> {
        let state = self.state.lock();
        state.check(LedgerOperation::RetryBudget)?;
        let batch = state.batch_of(correlation_id)?;
        let max_retries = state.step(batch.step_to_id)?.runtime_config.max_retries;
        let attempts = u32::try_from(state.attempt_count(batch.batch_id)).unwrap_or(u32::MAX);
        Ok(RetryBudget::new(max_retries, attempts))
    }

    async fn original_resource_uri(&self, correlation_id: Uuid) -> Result<String, LedgerError> {
        let state = self.state.lock();
        state.check(LedgerOperation::OriginalResourceUri)?;
        Ok(state.batch_of(correlation_id)?.uri.clone())
    }

    async fn create_batch(
        &self,
        step_from_id: Option<Uuid>,
        step_to_id: Uuid,
        uri: &str,
    ) -> Result<Batch, LedgerError> {
        let mut state = self.state.lock();
        state.check(LedgerOperation::CreateBatch)?;
        let batch = Batch::new(step_from_id, step_to_id, uri);
        state.batches.insert(batch.batch_id, batch.clone());
        Ok(batch)
    }

    async fn create_attempt(&self, batch_id: Uuid, correlation_id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        state.check(LedgerOperation::CreateAttempt)?;
        if !state.batches.contains_key(&batch_id) {
            return Err(LedgerError::not_found("batch", batch_id));
        }
        if state.attempts.contains_key(&correlation_id) {
            return Err(LedgerError::Backend(format!(
                "duplicate correlation id {correlation_id}"
            )));
        }
        state
            .attempts
            .insert(correlation_id, BatchAttempt::new(batch_id, correlation_id));
        Ok(())
    }

    async fn set_attempt_outcome(
        &self,
        correlation_id: Uuid,
        state: AttemptState,
        error: &str,
    ) -> Result<(), LedgerError> {
        let mut guard = self.state.lock();
        guard.check(LedgerOperation::SetAttemptOutcome)?;
        let attempt = guard
            .attempts
            .get_mut(&correlation_id)
            .ok_or_else(|| LedgerError::not_found("attempt", correlation_id))?;
        attempt.finish(state, error);
        Ok(())
    }

    async fn batch_by_correlation_id(&self, correlation_id: Uuid) -> Result<Batch, LedgerError> {
        let state = self.state.lock();
        state.check(LedgerOperation::BatchByCorrelationId)?;
        state.batch_of(correlation_id).cloned()
    }

    async fn discard_batch(&self, correlation_id: Uuid) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        state.check(LedgerOperation::DiscardBatch)?;
        let batch_id = state.batch_of(correlation_id)?.batch_id;
        state.attempts.retain(|_, a| a.batch_id != batch_id);
        state.batches.remove(&batch_id);
        Ok(())
    }

    async fn pipeline_by_id(&self, pipeline_id: Uuid) -> Result<Pipeline, LedgerError> {
        let state = self.state.lock();
        state.check(LedgerOperation::PipelineById)?;
        state
            .pipelines
            .get(&pipeline_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found("pipeline", pipeline_id))
    }
}
