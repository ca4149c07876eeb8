//! A worker that answers requests from a fixed script.

use crate::errors::TransportError;
use crate::rpc::{ProcessRequest, ProcessResponse};
use crate::transport::{InMemoryTransport, Transport};
use crate::wiring::ChannelPair;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One scripted answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Report success, with the request's result location as output.
    Ok,
    /// Report a failure.
    Error(String),
    /// Report that no more output will follow.
    AllDone,
    /// Publish an undecodable body, then move on to the next reply for the
    /// same request.
    Garbage,
}

/// Stands in for a deployed worker on one channel pair.
///
/// The worker answers one request per scripted reply (`Garbage` entries do
/// not consume a request) and closes its response channel once the script
/// is exhausted, which ends the engine loop consuming it.
#[derive(Debug, Clone)]
pub struct ScriptedWorker {
    name: String,
    request: String,
    response: String,
    script: VecDeque<ScriptedReply>,
}

impl ScriptedWorker {
    /// Creates a worker for a wired pair with an empty script.
    #[must_use]
    pub fn for_pair(pair: &ChannelPair) -> Self {
        Self {
            name: pair.name().to_string(),
            request: pair.request.clone(),
            response: pair.response.clone(),
            script: VecDeque::new(),
        }
    }

    /// Appends a reply.
    #[must_use]
    pub fn reply(mut self, reply: ScriptedReply) -> Self {
        self.script.push_back(reply);
        self
    }

    /// Appends several replies.
    #[must_use]
    pub fn replies(mut self, replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        self.script.extend(replies);
        self
    }

    /// Declares the pair's channels if needed and starts answering.
    ///
    /// The handle resolves to every request received, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the channels cannot be declared or consumed.
    pub async fn start(
        self,
        transport: Arc<InMemoryTransport>,
    ) -> Result<JoinHandle<Result<Vec<ProcessRequest>, TransportError>>, TransportError> {
        for channel in [&self.request, &self.response] {
            if !transport.is_declared(channel) {
                transport.declare_and_purge(channel).await?;
            }
        }
        let requests = transport.consume(&self.request).await?;
        Ok(tokio::spawn(self.serve(transport, requests)))
    }

    async fn serve(
        mut self,
        transport: Arc<InMemoryTransport>,
        mut requests: crate::transport::DeliveryStream,
    ) -> Result<Vec<ProcessRequest>, TransportError> {
        let mut received = Vec::new();

        while !self.script.is_empty() {
            let Some(delivery) = requests.next().await else {
                break;
            };
            let request = match ProcessRequest::decode(delivery.payload()) {
                Ok(request) => request,
                Err(err) => {
                    warn!(worker = %self.name, error = %err, "Worker got an undecodable request");
                    delivery.nack(false).await?;
                    continue;
                }
            };
            delivery.ack().await?;
            debug!(worker = %self.name, correlation_id = %request.correlation_id, "Worker got request");

            while let Some(reply) = self.script.pop_front() {
                let body = match reply {
                    ScriptedReply::Garbage => {
                        transport.publish(&self.response, b"{not a response".to_vec()).await?;
                        continue;
                    }
                    ScriptedReply::Ok => {
                        ProcessResponse::ok(request.correlation_id, request.result_uri.clone())
                    }
                    ScriptedReply::Error(error) => ProcessResponse::error(request.correlation_id, error),
                    ScriptedReply::AllDone => ProcessResponse::all_done(request.correlation_id),
                };
                let payload = body
                    .encode()
                    .map_err(|e| TransportError::Broker(e.to_string()))?;
                transport.publish(&self.response, payload).await?;
                break;
            }
            received.push(request);
        }

        transport.close(&self.response);
        debug!(worker = %self.name, requests = received.len(), "Worker finished");
        Ok(received)
    }
}
