//! Runtime core: the concurrent delivery-processing-acknowledgment pipeline.
//!
//! The only public API from this module is [`Consumer`] (plus its builder),
//! which orchestrates the control task, worker fan-out and graceful
//! shutdown.
//!
//! Internal modules:
//! - `dispatcher`: control task owning the broker channel;
//! - `worker`: one handler invocation per delivery;
//! - `relay`: many-producer/single-consumer ack handoff;
//! - `registry`: in-flight worker bookkeeping and admission;
//! - `shutdown`: cross-platform shutdown signal handling.

mod builder;
mod consumer;
mod dispatcher;
mod registry;
mod relay;
mod shutdown;
mod worker;

pub use builder::ConsumerBuilder;
pub use consumer::Consumer;
pub use registry::{WorkerHandle, WorkerStatus};
pub use relay::{AckOutcome, AckRelay, AckRequest};
