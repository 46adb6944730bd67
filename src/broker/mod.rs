//! # Broker capabilities and adapters.
//!
//! This module defines the seam between the dispatch runtime and the broker:
//! - [`Delivery`] — one unit of message data, tagged for acknowledgment
//! - [`BrokerChannel`] — consuming capability, owned by the control task
//! - [`Publish`] — producing capability, used by the companion publisher
//!
//! Two adapters are provided:
//! - [`AmqpChannel`] / [`AmqpPublisher`] — RabbitMQ via `lapin`
//! - [`MemoryBroker`] — in-process broker with credit-accurate prefetch,
//!   used by tests and demos

mod amqp;
mod channel;
mod memory;

pub use amqp::{AmqpChannel, AmqpPublisher};
pub use channel::{BrokerChannel, Delivery, Publish};
pub use memory::{ChannelOp, MemoryBroker, MemoryChannel, MemoryPublisher};
