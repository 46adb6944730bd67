//! # jobpump
//!
//! **jobpump** is a point-to-point job dispatch layer on a durable message
//! broker: a publisher enqueues work descriptors, and a consumer pulls,
//! processes and acknowledges them concurrently.
//!
//! The crate is built around one hard constraint: the broker channel is a
//! single, non-thread-safe protocol endpoint, so **all protocol I/O runs on
//! one control task** while handler work fans out to independent worker
//! tasks — one per delivery, bounded by the broker's prefetch credit rather
//! than an in-process pool.
//!
//! ## Architecture
//! ```text
//!     ┌───────────────┐   publish    ┌──────────────────────┐
//!     │   Publisher    │ ───────────► │  Broker (exchange →  │
//!     └───────────────┘  persistent  │  durable queue)      │
//!                                    └──────────┬───────────┘
//!                                  deliveries   │ credit: prefetch
//!                                               ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Consumer (control task)                                         │
//! │  - Dispatcher: owns the BrokerChannel, the only protocol writer  │
//! │  - WorkerRegistry: in-flight handles, pruned on settle           │
//! │  - Bus (broadcast events) ──► SubscriberSet ──► subscribers      │
//! └──────┬──────────────────┬──────────────────┬─────────────────────┘
//!        ▼ spawn            ▼ spawn            ▼ spawn
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  WorkerUnit  │   │  WorkerUnit  │   │  WorkerUnit  │
//!     │ (TaskHandler)│   │ (TaskHandler)│   │ (TaskHandler)│
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘
//!      │ submit(Ack/Nack) │                  │
//!      ▼                  ▼                  ▼
//! ┌──────────────────────────────────────────────────────────────────┐
//! │            AckRelay (mpsc, many producers → control task)        │
//! └─────────────────────────────────┬────────────────────────────────┘
//!                                   ▼
//!                      channel.ack / channel.nack
//! ```
//!
//! ## Lifecycle
//! ```text
//! Accepting ──(signal / token / stream end)──► Draining ──► Closed
//!
//! Accepting: deliveries spawn workers; relay drained with priority
//! Draining:  no new intake; in-flight workers finish and are settled
//! Closed:    channel closed; run() returns
//! ```
//!
//! ## Guarantees
//! - **At-least-once**: every delivery yields exactly one terminal Ack or
//!   Nack — success, handler error, handler panic and spawn rejection all
//!   converge on an outcome.
//! - **Single-writer channel**: worker units hold only the relay sender;
//!   the channel moves into the control task and never escapes it.
//! - **Credit-bounded fan-out**: in-flight work never exceeds the broker's
//!   prefetch credit; acks are applied with priority so a slow worker never
//!   stalls the credit loop.
//! - **Cooperative drain**: shutdown stops intake only; workers are never
//!   preempted (optionally bounded by `Config::grace`).
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use jobpump::{AmqpChannel, Config, Consumer, HandlerFn, HandlerRef, LogWriter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = Config::from_env()?;
//!     let channel = AmqpChannel::connect(&cfg).await?;
//!
//!     let handler: HandlerRef = HandlerFn::arc(|body: Vec<u8>| async move {
//!         println!("processing {} bytes", body.len());
//!         Ok(())
//!     });
//!     let consumer = Consumer::builder(cfg)
//!         .with_handler(handler)
//!         .with_subscribers(vec![Arc::new(LogWriter)])
//!         .build();
//!
//!     consumer.run(channel).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;

pub mod broker;
pub mod core;
pub mod events;
pub mod handlers;
pub mod publisher;
pub mod subscribers;

// ---- Public re-exports ----

pub use broker::{
    AmqpChannel, AmqpPublisher, BrokerChannel, ChannelOp, Delivery, MemoryBroker, Publish,
};
pub use config::Config;
pub use core::{AckOutcome, AckRequest, Consumer, ConsumerBuilder, WorkerHandle, WorkerStatus};
pub use error::{ConfigError, HandlerError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use handlers::{HandlerFn, HandlerRef, NoopHandler, TaskHandler};
pub use publisher::Publisher;
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
