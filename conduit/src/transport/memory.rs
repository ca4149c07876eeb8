//! In-process broker.

use super::{Delivery, DeliveryStream, Transport};
use crate::errors::TransportError;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledged.
    Acked,
    /// Rejected and dropped.
    Rejected,
    /// Rejected and put back at the head of the channel.
    Requeued,
}

/// A settled delivery, kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettledDelivery {
    /// Channel the message was consumed from.
    pub channel: String,
    /// The message body.
    pub payload: Vec<u8>,
    /// How it was settled.
    pub disposition: Disposition,
}

#[derive(Debug, Default)]
struct ChannelQueue {
    messages: Mutex<VecDeque<Vec<u8>>>,
    closed: AtomicBool,
    notify: Notify,
}

impl ChannelQueue {
    fn push_back(&self, payload: Vec<u8>) {
        self.messages.lock().push_back(payload);
        self.notify.notify_waiters();
    }

    fn push_front(&self, payload: Vec<u8>) {
        self.messages.lock().push_front(payload);
        self.notify.notify_waiters();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Waits for the next message. `None` once closed and drained.
    async fn next(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.notify.notified();
            if let Some(payload) = self.messages.lock().pop_front() {
                return Some(payload);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }
}

struct MemoryDelivery {
    channel: String,
    payload: Vec<u8>,
    queue: Arc<ChannelQueue>,
    settled: AtomicBool,
    log: Arc<Mutex<Vec<SettledDelivery>>>,
}

impl MemoryDelivery {
    fn settle(&self, disposition: Disposition) -> Result<(), TransportError> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(TransportError::Broker(format!(
                "delivery on {} already settled",
                self.channel
            )));
        }
        if disposition == Disposition::Requeued {
            self.queue.push_front(self.payload.clone());
        }
        self.log.lock().push(SettledDelivery {
            channel: self.channel.clone(),
            payload: self.payload.clone(),
            disposition,
        });
        Ok(())
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<(), TransportError> {
        self.settle(Disposition::Acked)
    }

    async fn nack(&self, requeue: bool) -> Result<(), TransportError> {
        self.settle(if requeue {
            Disposition::Requeued
        } else {
            Disposition::Rejected
        })
    }
}

/// A [`Transport`] backed by in-process FIFO queues.
///
/// Consumer streams end once their channel is [closed](Self::close) and
/// drained. Every publish and every settled delivery is recorded.
#[derive(Default)]
pub struct InMemoryTransport {
    channels: DashMap<String, Arc<ChannelQueue>>,
    published: DashMap<String, Vec<Vec<u8>>>,
    settled: Arc<Mutex<Vec<SettledDelivery>>>,
    failing_declare: DashSet<String>,
    failing_publish: DashSet<String>,
}

impl InMemoryTransport {
    /// Creates a transport with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, channel: &str) -> Result<Arc<ChannelQueue>, TransportError> {
        self.channels
            .get(channel)
            .map(|q| Arc::clone(q.value()))
            .ok_or_else(|| TransportError::ChannelNotFound(channel.to_string()))
    }

    /// Closes a channel. Its consumers end after draining what is queued.
    pub fn close(&self, channel: &str) {
        if let Some(queue) = self.channels.get(channel) {
            queue.close();
        }
    }

    /// Closes every channel.
    pub fn close_all(&self) {
        for queue in self.channels.iter() {
            queue.close();
        }
    }

    /// Returns true if the channel has been declared.
    #[must_use]
    pub fn is_declared(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Number of messages waiting on a channel.
    #[must_use]
    pub fn queued(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map_or(0, |q| q.messages.lock().len())
    }

    /// Every body published on a channel, in publish order.
    #[must_use]
    pub fn published(&self, channel: &str) -> Vec<Vec<u8>> {
        self.published
            .get(channel)
            .map(|p| p.value().clone())
            .unwrap_or_default()
    }

    /// Number of bodies published on a channel.
    #[must_use]
    pub fn published_count(&self, channel: &str) -> usize {
        self.published.get(channel).map_or(0, |p| p.len())
    }

    /// Every settled delivery, in settlement order.
    #[must_use]
    pub fn settled(&self) -> Vec<SettledDelivery> {
        self.settled.lock().clone()
    }

    /// Settled deliveries of one channel.
    #[must_use]
    pub fn settled_on(&self, channel: &str) -> Vec<SettledDelivery> {
        self.settled
            .lock()
            .iter()
            .filter(|d| d.channel == channel)
            .cloned()
            .collect()
    }

    /// Makes declaring `channel` fail.
    pub fn fail_declare(&self, channel: impl Into<String>) {
        self.failing_declare.insert(channel.into());
    }

    /// Makes publishing on `channel` fail.
    pub fn fail_publish(&self, channel: impl Into<String>) {
        self.failing_publish.insert(channel.into());
    }

    /// Removes every injected failure.
    pub fn clear_failures(&self) {
        self.failing_declare.clear();
        self.failing_publish.clear();
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("channels", &self.channels.len())
            .field("settled", &self.settled.lock().len())
            .finish()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn declare_and_purge(&self, channel: &str) -> Result<(), TransportError> {
        if self.failing_declare.contains(channel) {
            return Err(TransportError::Injected(channel.to_string()));
        }
        let queue = self
            .channels
            .entry(channel.to_string())
            .or_default()
            .value()
            .clone();
        let purged = {
            let mut messages = queue.messages.lock();
            let count = messages.len();
            messages.clear();
            count
        };
        debug!(channel, purged, "Declared channel");
        Ok(())
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if self.failing_publish.contains(channel) {
            return Err(TransportError::Injected(channel.to_string()));
        }
        let queue = self.queue(channel)?;
        if queue.is_closed() {
            return Err(TransportError::ChannelClosed(channel.to_string()));
        }
        self.published
            .entry(channel.to_string())
            .or_default()
            .push(payload.clone());
        queue.push_back(payload);
        Ok(())
    }

    async fn consume(&self, channel: &str) -> Result<DeliveryStream, TransportError> {
        let queue = self.queue(channel)?;
        let channel = channel.to_string();
        let log = Arc::clone(&self.settled);

        let deliveries = stream::unfold(queue, move |queue| {
            let channel = channel.clone();
            let log = Arc::clone(&log);
            async move {
                let payload = queue.next().await?;
                let delivery: Box<dyn Delivery> = Box::new(MemoryDelivery {
                    channel,
                    payload,
                    queue: Arc::clone(&queue),
                    settled: AtomicBool::new(false),
                    log,
                });
                Some((delivery, queue))
            }
        });

        Ok(deliveries.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn declared(channels: &[&str]) -> InMemoryTransport {
        let transport = InMemoryTransport::new();
        for channel in channels {
            transport.declare_and_purge(channel).await.unwrap();
        }
        transport
    }

    #[tokio::test]
    async fn test_publish_then_consume_in_order() {
        let transport = declared(&["q"]).await;
        transport.publish("q", b"one".to_vec()).await.unwrap();
        transport.publish("q", b"two".to_vec()).await.unwrap();
        transport.close("q");

        let mut stream = transport.consume("q").await.unwrap();
        let mut bodies = Vec::new();
        while let Some(delivery) = stream.next().await {
            bodies.push(delivery.payload().to_vec());
            delivery.ack().await.unwrap();
        }

        assert_eq!(bodies, vec![b"one".to_vec(), b"two".to_vec()]);
        assert_eq!(transport.settled_on("q").len(), 2);
        assert_eq!(transport.published_count("q"), 2);
    }

    #[tokio::test]
    async fn test_consumer_waits_for_publish() {
        let transport = Arc::new(declared(&["q"]).await);
        let mut stream = transport.consume("q").await.unwrap();

        let publisher = {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                transport.publish("q", b"late".to_vec()).await.unwrap();
            })
        };

        let delivery = stream.next().await.unwrap();
        assert_eq!(delivery.payload(), b"late");
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_declare_purges() {
        let transport = declared(&["q"]).await;
        transport.publish("q", b"stale".to_vec()).await.unwrap();
        assert_eq!(transport.queued("q"), 1);

        transport.declare_and_purge("q").await.unwrap();
        assert_eq!(transport.queued("q"), 0);
    }

    #[tokio::test]
    async fn test_nack_requeue_puts_message_back_first() {
        let transport = declared(&["q"]).await;
        transport.publish("q", b"a".to_vec()).await.unwrap();
        transport.publish("q", b"b".to_vec()).await.unwrap();

        let mut stream = transport.consume("q").await.unwrap();
        let first = stream.next().await.unwrap();
        first.nack(true).await.unwrap();

        let again = stream.next().await.unwrap();
        assert_eq!(again.payload(), b"a");
        again.nack(false).await.unwrap();

        let dispositions: Vec<Disposition> = transport.settled().iter().map(|d| d.disposition).collect();
        assert_eq!(dispositions, vec![Disposition::Requeued, Disposition::Rejected]);
    }

    #[tokio::test]
    async fn test_double_settle_rejected() {
        let transport = declared(&["q"]).await;
        transport.publish("q", b"a".to_vec()).await.unwrap();

        let mut stream = transport.consume("q").await.unwrap();
        let delivery = stream.next().await.unwrap();
        delivery.ack().await.unwrap();

        assert!(delivery.ack().await.is_err());
        assert_eq!(transport.settled().len(), 1);
    }

    #[tokio::test]
    async fn test_undeclared_channel() {
        let transport = InMemoryTransport::new();
        assert_eq!(
            transport.publish("nope", Vec::new()).await.unwrap_err(),
            TransportError::ChannelNotFound("nope".to_string())
        );
        assert!(transport.consume("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_publish_to_closed_channel() {
        let transport = declared(&["q"]).await;
        transport.close("q");
        assert!(matches!(
            transport.publish("q", Vec::new()).await,
            Err(TransportError::ChannelClosed(_))
        ));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let transport = declared(&["q"]).await;
        transport.fail_publish("q");
        transport.fail_declare("r");

        assert!(matches!(
            transport.publish("q", Vec::new()).await,
            Err(TransportError::Injected(_))
        ));
        assert!(transport.declare_and_purge("r").await.is_err());
        assert!(!transport.is_declared("r"));

        transport.clear_failures();
        transport.publish("q", Vec::new()).await.unwrap();
        transport.declare_and_purge("r").await.unwrap();
    }
}
