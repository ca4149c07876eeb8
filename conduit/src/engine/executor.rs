//! Pipeline executor.

use super::processing::{NodeRunner, RunContext};
use super::{EngineConfig, NodeOutcome, NodeReport, NodeStats, ResultLocator, RunReport};
use crate::cancellation::CancellationToken;
use crate::errors::ConduitError;
use crate::events::{kinds, EventSink, NoOpEventSink};
use crate::ledger::BatchLedger;
use crate::model::Pipeline;
use crate::transport::Transport;
use crate::wiring::ChannelWiring;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

/// Drives one pipeline: one control loop per wired step.
///
/// # Example
///
/// ```rust,ignore
/// use conduit::prelude::*;
/// use std::sync::Arc;
///
/// let ledger = Arc::new(InMemoryLedger::with_pipeline(pipeline.clone()));
/// let transport = Arc::new(InMemoryTransport::new());
/// let executor = PipelineExecutor::new(
///     pipeline,
///     ledger,
///     transport,
///     EngineConfig::new("s3://results"),
/// )?;
///
/// let report = executor.run().await?.into_result()?;
/// ```
pub struct PipelineExecutor {
    pipeline: Pipeline,
    wiring: Arc<ChannelWiring>,
    ledger: Arc<dyn BatchLedger>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
    events: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl PipelineExecutor {
    /// Builds the topology and channel wiring of `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Config`] for invalid configuration and
    /// [`ConduitError::Topology`] if the pipeline has no root or a cycle.
    pub fn new(
        pipeline: Pipeline,
        ledger: Arc<dyn BatchLedger>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Result<Self, ConduitError> {
        config.validate()?;
        let graph = pipeline.topology()?;
        let wiring = ChannelWiring::from_graph(&graph)?;

        info!(
            pipeline = %pipeline.name,
            pipeline_id = %pipeline.id,
            steps = pipeline.step_count(),
            nodes = wiring.len(),
            root = wiring.root().name(),
            "Pipeline wired"
        );

        Ok(Self {
            pipeline,
            wiring: Arc::new(wiring),
            ledger,
            transport,
            config,
            events: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        })
    }

    /// Loads a pipeline definition from the ledger, then behaves like [`Self::new`].
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::Ledger`] if the pipeline cannot be loaded, or
    /// any error of [`Self::new`].
    pub async fn load(
        pipeline_id: Uuid,
        ledger: Arc<dyn BatchLedger>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Result<Self, ConduitError> {
        let pipeline = ledger.pipeline_by_id(pipeline_id).await?;
        Self::new(pipeline, ledger, transport, config)
    }

    /// Sends lifecycle events to `sink`.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// The token that stops every node loop of this executor.
    #[must_use]
    pub fn cancel_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancel)
    }

    /// The channel wiring.
    #[must_use]
    pub fn wiring(&self) -> &ChannelWiring {
        &self.wiring
    }

    /// The pipeline definition.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declares every channel, then runs one loop per node until all end.
    ///
    /// Node failures do not fail the run: they are reported per node. Use
    /// [`RunReport::into_result`] to turn them into an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConduitError::ChannelSetup`] if any channel cannot be
    /// declared. No loop is started in that case.
    pub async fn run(&self) -> Result<RunReport, ConduitError> {
        self.declare_channels().await?;

        self.events
            .emit(
                kinds::RUN_STARTED,
                Some(json!({ "pipeline": self.pipeline.name, "nodes": self.wiring.len() })),
            )
            .await;

        let context = Arc::new(RunContext {
            wiring: Arc::clone(&self.wiring),
            ledger: Arc::clone(&self.ledger),
            transport: Arc::clone(&self.transport),
            events: Arc::clone(&self.events),
            cancel: Arc::clone(&self.cancel),
            locator: ResultLocator::from_config(&self.config),
            config: self.config.clone(),
        });

        let started = Instant::now();
        let (results_tx, mut results_rx) = mpsc::channel::<NodeReport>(self.wiring.len().max(1));
        let mut handles = Vec::with_capacity(self.wiring.len());

        for (index, pair) in self.wiring.pairs().iter().enumerate() {
            let Some(runner) = NodeRunner::new(Arc::clone(&context), index) else {
                continue;
            };
            let results_tx = results_tx.clone();
            let span = info_span!("node", step = %pair.name(), step_id = %pair.step().id);
            let handle = tokio::spawn(
                async move {
                    let report = runner.run().await;
                    if results_tx.send(report).await.is_err() {
                        debug!("Run coordinator stopped listening");
                    }
                }
                .instrument(span),
            );
            handles.push((index, handle));
        }
        drop(results_tx);

        info!(nodes = handles.len(), "Node loops started");

        let mut panicked = Vec::new();
        for (index, handle) in handles {
            if let Err(join_error) = handle.await {
                if let Some(pair) = self.wiring.pair(index) {
                    let message = panic_message(join_error);
                    error!(step = pair.name(), message = %message, "Node task panicked");
                    panicked.push(NodeReport {
                        step_name: pair.name().to_string(),
                        step_id: pair.step().id,
                        outcome: NodeOutcome::Panicked(message),
                        stats: NodeStats::default(),
                    });
                }
            }
        }

        let mut nodes = Vec::with_capacity(self.wiring.len());
        while let Some(report) = results_rx.recv().await {
            nodes.push(report);
        }
        nodes.extend(panicked);
        nodes.sort_by_key(|node| self.wiring.index_of(&node.step_name));

        let report = RunReport {
            nodes,
            elapsed: started.elapsed(),
        };

        let failed = report.failures().len();
        info!(
            pipeline = %self.pipeline.name,
            failed,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Run finished"
        );
        self.events
            .emit(
                kinds::RUN_COMPLETED,
                Some(json!({ "pipeline": self.pipeline.name, "failed_nodes": failed })),
            )
            .await;

        Ok(report)
    }

    async fn declare_channels(&self) -> Result<(), ConduitError> {
        for channel in self.wiring.channel_names() {
            self.transport
                .declare_and_purge(channel)
                .await
                .map_err(|source| {
                    error!(channel, error = %source, "Channel setup failed");
                    ConduitError::ChannelSetup {
                        channel: channel.to_string(),
                        source,
                    }
                })?;
        }
        debug!(channels = self.wiring.len() * 2, "Channels declared");
        Ok(())
    }
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("pipeline", &self.pipeline.name)
            .field("nodes", &self.wiring.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
