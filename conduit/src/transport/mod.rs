//! Message transport: channel declaration, publishing and consumption.
//!
//! Delivery and acknowledgement semantics belong to the broker. The engine
//! only promises to settle every delivery it receives exactly once.

mod memory;

pub use memory::{Disposition, InMemoryTransport, SettledDelivery};

use crate::errors::TransportError;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// One inbound message.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// The message body.
    fn payload(&self) -> &[u8];

    /// Acknowledges the message.
    async fn ack(&self) -> Result<(), TransportError>;

    /// Rejects the message, optionally returning it to the channel.
    async fn nack(&self, requeue: bool) -> Result<(), TransportError>;
}

/// The messages of one channel, in delivery order. Ends when the broker
/// closes the channel.
pub type DeliveryStream = BoxStream<'static, Box<dyn Delivery>>;

/// Broker operations the execution engine depends on.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declares a channel, discarding any messages already queued on it.
    async fn declare_and_purge(&self, channel: &str) -> Result<(), TransportError>;

    /// Publishes a message body.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Starts consuming a channel.
    async fn consume(&self, channel: &str) -> Result<DeliveryStream, TransportError>;
}
