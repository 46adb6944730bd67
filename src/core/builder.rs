//! Builder for constructing a [`Consumer`] with optional features.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::consumer::Consumer;
use crate::events::Bus;
use crate::handlers::{HandlerRef, NoopHandler};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Consumer`].
///
/// Must be finished inside a tokio runtime: `build()` spawns the subscriber
/// worker tasks.
pub struct ConsumerBuilder {
    cfg: Config,
    handler: Option<HandlerRef>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl ConsumerBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            handler: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the task handler invoked per message.
    ///
    /// Defaults to [`NoopHandler`], which accepts everything.
    pub fn with_handler(mut self, handler: HandlerRef) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (delivery intake, worker
    /// lifecycle, acknowledgments, shutdown) through dedicated workers with
    /// bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the consumer and wires the event fan-out.
    pub fn build(self) -> Consumer {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        Consumer::spawn_subscriber_listener(&bus, &subs);

        Consumer {
            cfg: self.cfg,
            bus,
            subs,
            handler: self.handler.unwrap_or_else(|| Arc::new(NoopHandler)),
            token: CancellationToken::new(),
        }
    }
}
