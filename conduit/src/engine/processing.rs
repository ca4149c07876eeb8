//! Per-node control loops and response handlers.

use super::{EngineConfig, ExhaustedRetryPolicy, NodeOutcome, NodeReport, NodeStats, ResultLocator};
use crate::cancellation::CancellationToken;
use crate::errors::EngineError;
use crate::events::{kinds, EventSink};
use crate::ledger::BatchLedger;
use crate::model::{AttemptState, Batch, RetryBudget};
use crate::rpc::{ProcessRequest, ResponseEvent, ResponseOutcome};
use crate::transport::{Delivery, DeliveryStream, Transport};
use crate::wiring::{ChannelPair, ChannelWiring};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Everything a node loop shares with its siblings for one run.
pub(crate) struct RunContext {
    pub(crate) wiring: Arc<ChannelWiring>,
    pub(crate) ledger: Arc<dyn BatchLedger>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) cancel: Arc<CancellationToken>,
    pub(crate) config: EngineConfig,
    pub(crate) locator: ResultLocator,
}

/// The control loop of one channel pair.
pub(crate) struct NodeRunner {
    context: Arc<RunContext>,
    index: usize,
    pair: ChannelPair,
    is_root: bool,
    stats: NodeStats,
}

impl NodeRunner {
    /// Creates the loop for the pair at `index`, or `None` if there is none.
    pub(crate) fn new(context: Arc<RunContext>, index: usize) -> Option<Self> {
        let pair = context.wiring.pair(index)?.clone();
        let is_root = index == context.wiring.root_index();
        Some(Self {
            context,
            index,
            pair,
            is_root,
            stats: NodeStats::default(),
        })
    }

    /// Runs the loop to its end and reports how it went.
    pub(crate) async fn run(mut self) -> NodeReport {
        self.emit(kinds::NODE_STARTED, json!({ "root": self.is_root })).await;

        let outcome = match self.drive().await {
            Ok(outcome) => outcome,
            Err(err) => NodeOutcome::Failed(err),
        };

        match &outcome {
            NodeOutcome::Completed => {
                info!(acked = self.stats.acked, "Response stream closed");
                self.emit(kinds::NODE_COMPLETED, json!({ "acked": self.stats.acked })).await;
            }
            NodeOutcome::Cancelled => {
                info!(reason = ?self.context.cancel.reason(), "Node cancelled");
                self.emit(kinds::NODE_CANCELLED, Value::Null).await;
            }
            NodeOutcome::Failed(err) => {
                error!(error = %err, "Node stopped on error");
                self.emit(kinds::NODE_FAILED, json!({ "error": err.to_string() })).await;
            }
            NodeOutcome::Panicked(_) => {}
        }

        NodeReport {
            step_name: self.pair.name().to_string(),
            step_id: self.pair.step().id,
            outcome,
            stats: self.stats,
        }
    }

    async fn drive(&mut self) -> Result<NodeOutcome, EngineError> {
        let context = Arc::clone(&self.context);
        let timeout = context.config.response_timeout();
        let mut done = false;

        if self.is_root {
            self.pump().await?;
        }

        let mut deliveries = context.transport.consume(&self.pair.response).await?;

        loop {
            let next = tokio::select! {
                biased;
                () = context.cancel.cancelled() => return Ok(NodeOutcome::Cancelled),
                next = next_delivery(&mut deliveries, timeout, &self.pair.response) => next?,
            };
            let Some(delivery) = next else {
                return Ok(NodeOutcome::Completed);
            };
            self.stats.received += 1;

            let event = match ResponseEvent::decode(delivery.payload()) {
                Ok(event) => event,
                Err(err) => {
                    self.reject(&*delivery, &err.to_string()).await?;
                    continue;
                }
            };

            if self.is_root && event.outcome == ResponseOutcome::AllDone {
                done = true;
            }

            self.handle(event).await?;

            if self.is_root && !done {
                self.pump().await?;
            }

            delivery.ack().await?;
            self.stats.acked += 1;
        }
    }

    async fn reject(&mut self, delivery: &dyn Delivery, reason: &str) -> Result<(), EngineError> {
        warn!(channel = %self.pair.response, reason, "Rejecting undecodable response");
        delivery.nack(false).await?;
        self.stats.rejected += 1;
        self.emit(kinds::MESSAGE_REJECTED, json!({ "reason": reason })).await;
        Ok(())
    }

    /// Dispatches one decoded response.
    pub(crate) async fn handle(&mut self, event: ResponseEvent) -> Result<(), EngineError> {
        let ResponseEvent {
            correlation_id,
            outcome,
        } = event;
        debug!(%correlation_id, outcome = outcome.label(), "Processing response");

        match outcome {
            ResponseOutcome::Succeeded { result_uri } => {
                self.stats.succeeded += 1;
                self.on_succeeded(correlation_id, &result_uri).await
            }
            ResponseOutcome::Failed { error } => {
                self.stats.failed += 1;
                self.on_failed(correlation_id, &error).await
            }
            ResponseOutcome::AllDone => {
                self.stats.all_done += 1;
                self.on_all_done(correlation_id).await
            }
        }
    }

    /// Originates a fresh batch into the root's request channel.
    pub(crate) async fn pump(&mut self) -> Result<(), EngineError> {
        let context = Arc::clone(&self.context);
        let request = ProcessRequest::new(
            "",
            context.locator.next_result_uri(),
            context.locator.next_correlation_id(),
        );

        let batch = context
            .ledger
            .create_batch(None, self.pair.step().id, &request.resource_uri)
            .await?;
        context
            .ledger
            .create_attempt(batch.batch_id, request.correlation_id)
            .await?;
        context
            .transport
            .publish(&self.pair.request, request.encode()?)
            .await?;

        self.stats.pumped += 1;
        debug!(
            batch_id = %batch.batch_id,
            correlation_id = %request.correlation_id,
            "Pumped batch into root"
        );
        self.emit(
            kinds::BATCH_PUMPED,
            json!({ "batch_id": batch.batch_id, "correlation_id": request.correlation_id }),
        )
        .await;
        Ok(())
    }

    async fn on_succeeded(&mut self, correlation_id: Uuid, result_uri: &str) -> Result<(), EngineError> {
        let context = Arc::clone(&self.context);
        context
            .ledger
            .set_attempt_outcome(correlation_id, AttemptState::Ok, "")
            .await?;

        if self.pair.is_terminal() {
            debug!(%correlation_id, "Terminal node, nothing to forward");
            return Ok(());
        }

        for next in context.wiring.successors(self.index) {
            let request = ProcessRequest::new(
                result_uri,
                context.locator.next_result_uri(),
                context.locator.next_correlation_id(),
            );
            let batch = context
                .ledger
                .create_batch(Some(self.pair.step().id), next.step().id, &request.resource_uri)
                .await?;
            context
                .ledger
                .create_attempt(batch.batch_id, request.correlation_id)
                .await?;
            context
                .transport
                .publish(&next.request, request.encode()?)
                .await?;

            self.stats.advanced += 1;
            debug!(
                to = next.name(),
                batch_id = %batch.batch_id,
                correlation_id = %request.correlation_id,
                "Advanced result"
            );
            self.emit(
                kinds::BATCH_ADVANCED,
                json!({ "to": next.name(), "batch_id": batch.batch_id, "resource_uri": result_uri }),
            )
            .await;
        }
        Ok(())
    }

    async fn on_failed(&mut self, correlation_id: Uuid, error: &str) -> Result<(), EngineError> {
        let context = Arc::clone(&self.context);
        let batch = context.ledger.batch_by_correlation_id(correlation_id).await?;
        context
            .ledger
            .set_attempt_outcome(correlation_id, AttemptState::Error, error)
            .await?;
        warn!(%correlation_id, batch_id = %batch.batch_id, error, "Attempt failed");

        // The pump that follows this response replaces the failed root request.
        if self.is_root {
            return Ok(());
        }

        if self.pair.is_terminal() && !context.config.retry_terminal_failures {
            return Ok(());
        }

        let Some(target) = context.wiring.retry_target(self.index, batch.step_to_id) else {
            warn!(
                batch_id = %batch.batch_id,
                step_to_id = %batch.step_to_id,
                "No retry target for failed batch"
            );
            return Ok(());
        };

        let budget = context
            .ledger
            .retry_budget(correlation_id)
            .await
            .map_err(|source| EngineError::RetryBudgetLookup {
                correlation_id,
                source,
            })?;
        if budget.is_exhausted() {
            self.on_exhausted(&batch, budget).await;
            return Ok(());
        }

        let resource_uri = context
            .ledger
            .original_resource_uri(correlation_id)
            .await
            .map_err(|source| EngineError::ResourceLookup {
                correlation_id,
                source,
            })?;
        let request = ProcessRequest::new(
            resource_uri,
            context.locator.next_result_uri(),
            context.locator.next_correlation_id(),
        );
        context
            .ledger
            .create_attempt(batch.batch_id, request.correlation_id)
            .await?;
        context
            .transport
            .publish(&target.request, request.encode()?)
            .await?;

        self.stats.retried += 1;
        info!(
            batch_id = %batch.batch_id,
            attempt = budget.attempts + 1,
            max_retries = budget.max_retries,
            "Retrying batch"
        );
        self.emit(
            kinds::ATTEMPT_RETRIED,
            json!({
                "to": target.name(),
                "batch_id": batch.batch_id,
                "correlation_id": request.correlation_id,
                "attempt": budget.attempts + 1,
            }),
        )
        .await;
        Ok(())
    }

    async fn on_exhausted(&mut self, batch: &Batch, budget: RetryBudget) {
        match self.context.config.exhausted_retry_policy {
            ExhaustedRetryPolicy::Silent => {
                debug!(batch_id = %batch.batch_id, attempts = budget.attempts, "Retries exhausted");
            }
            ExhaustedRetryPolicy::Report => {
                warn!(
                    batch_id = %batch.batch_id,
                    attempts = budget.attempts,
                    max_retries = budget.max_retries,
                    "Retries exhausted, lineage stopped"
                );
                self.stats.exhausted.push(batch.batch_id);
                self.emit(
                    kinds::LINEAGE_EXHAUSTED,
                    json!({
                        "batch_id": batch.batch_id,
                        "attempts": budget.attempts,
                        "max_retries": budget.max_retries,
                        "uri": batch.uri,
                    }),
                )
                .await;
            }
        }
    }

    async fn on_all_done(&mut self, correlation_id: Uuid) -> Result<(), EngineError> {
        self.context.ledger.discard_batch(correlation_id).await?;
        debug!(%correlation_id, "Discarded batch");
        self.emit(kinds::BATCH_DISCARDED, json!({ "correlation_id": correlation_id }))
            .await;
        Ok(())
    }

    async fn emit(&self, event_type: &str, data: Value) {
        let mut payload = json!({
            "step": self.pair.name(),
            "step_id": self.pair.step().id,
        });
        if let (Value::Object(fields), Value::Object(extra)) = (&mut payload, data) {
            fields.extend(extra);
        }
        self.context.events.emit(event_type, Some(payload)).await;
    }

    #[cfg(test)]
    pub(crate) fn stats(&self) -> &NodeStats {
        &self.stats
    }
}

async fn next_delivery(
    deliveries: &mut DeliveryStream,
    timeout: Option<Duration>,
    channel: &str,
) -> Result<Option<Box<dyn Delivery>>, EngineError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, deliveries.next())
            .await
            .map_err(|_| EngineError::ResponseTimeout {
                channel: channel.to_string(),
                timeout: limit,
            }),
        None => Ok(deliveries.next().await),
    }
}
