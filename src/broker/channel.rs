//! # Broker channel and publish capabilities.
//!
//! [`BrokerChannel`] is the consuming side of a broker connection: a duplex
//! protocol endpoint that yields deliveries and accepts acknowledgments.
//! The protocol endpoint is **not** safe for concurrent use, and the trait
//! encodes that in the type system: methods take `&mut self`, and the value
//! is moved into the dispatcher's control task. Worker units never see it —
//! they hold only an ack-relay sender.
//!
//! [`Publish`] is the producing side, used by the companion
//! [`Publisher`](crate::Publisher). Publishing is fire-and-forget and
//! messages are marked persistent by the adapter.

use async_trait::async_trait;

use crate::error::RuntimeError;

/// One unit of message data handed to the consumer, tagged with an ordinal
/// for acknowledgment.
///
/// Exists from the moment the broker pushes it to the dispatch loop and is
/// consumed exactly once by exactly one worker unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned delivery tag, the ack/nack ordinal.
    pub tag: u64,
    /// Raw message body.
    pub body: Vec<u8>,
}

/// Consuming endpoint of a broker connection.
///
/// Owned exclusively by the dispatcher's control task; all protocol I/O is
/// serialized through that single owner.
///
/// ### Contract
/// - `recv` blocks until the next delivery; `Ok(None)` means the consume
///   stream ended (queue deleted, broker-side cancel).
/// - `ack`/`nack` reference deliveries by tag and may be applied out of
///   delivery order.
/// - `recv` errors are fatal to the dispatch loop; `ack`/`nack` errors are
///   reported but non-fatal (the broker redelivers unacked messages).
#[async_trait]
pub trait BrokerChannel: Send + 'static {
    /// Waits for the next delivery.
    async fn recv(&mut self) -> Result<Option<Delivery>, RuntimeError>;

    /// Positively acknowledges the delivery with the given tag.
    async fn ack(&mut self, tag: u64) -> Result<(), RuntimeError>;

    /// Negatively acknowledges the delivery with the given tag.
    ///
    /// With `requeue = true` the broker returns the message to the queue;
    /// otherwise it is dropped or dead-lettered per broker topology.
    async fn nack(&mut self, tag: u64, requeue: bool) -> Result<(), RuntimeError>;

    /// Closes the channel and the underlying connection.
    async fn close(&mut self) -> Result<(), RuntimeError>;
}

/// Producing endpoint of a broker connection.
#[async_trait]
pub trait Publish: Send + Sync + 'static {
    /// Publishes one message to the given routing key, fire-and-forget.
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), RuntimeError>;
}
