//! # Consumer: the public facade of the dispatch runtime.
//!
//! The [`Consumer`] owns the event bus, a [`SubscriberSet`] and the global
//! runtime configuration. Given a [`BrokerChannel`], [`Consumer::run`]
//! becomes the control task: it moves the channel into a [`Dispatcher`] and
//! drives it until shutdown.
//!
//! ## High-level architecture
//! ```text
//! Inputs:
//!   Config ──► Consumer::builder(cfg).with_handler(h).with_subscribers(s).build()
//!   channel ──► consumer.run(channel)
//!
//! Data flow:
//!   BrokerChannel ──► Dispatcher ──spawn──► WorkerUnit ──► TaskHandler
//!        ▲                                      │
//!        └────────── AckRelay ◄─────────────────┘
//!
//! Event flow:
//!   Dispatcher/Workers ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                      └─► SubscriberSet
//! Shutdown path:
//!   OS signal ──► token.cancel() ──► Dispatcher stops intake, drains,
//!   closes the channel, run() returns
//! ```

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::broker::BrokerChannel;
use crate::config::Config;
use crate::core::dispatcher::Dispatcher;
use crate::core::shutdown;
use crate::error::RuntimeError;
use crate::events::{Bus, Event};
use crate::handlers::HandlerRef;
use crate::subscribers::SubscriberSet;

use super::builder::ConsumerBuilder;

/// Coordinates the dispatch loop, event delivery and graceful shutdown for
/// one broker channel.
pub struct Consumer {
    /// Global runtime configuration.
    pub cfg: Config,
    /// Event bus shared with the dispatcher and all workers.
    pub bus: Bus,
    /// Fan-out set for subscribers.
    pub subs: Arc<SubscriberSet>,
    pub(crate) handler: HandlerRef,
    pub(crate) token: CancellationToken,
}

impl Consumer {
    /// Starts building a consumer with the given configuration.
    pub fn builder(cfg: Config) -> ConsumerBuilder {
        ConsumerBuilder::new(cfg)
    }

    /// Token that stops delivery intake when cancelled.
    ///
    /// Cancelling is equivalent to receiving a termination signal: in-flight
    /// workers still finish and their acks are still applied.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// New receiver observing all subsequent runtime events.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Runs the consumer until the stream ends or shutdown is requested,
    /// then drains and closes the channel.
    ///
    /// The calling task becomes the control task: the only owner of the
    /// channel for the whole run. Termination signals (SIGINT/SIGTERM/…)
    /// cancel the shutdown token.
    pub async fn run<C: BrokerChannel>(&self, channel: C) -> Result<(), RuntimeError> {
        let signal_task = self.spawn_signal_listener();

        let dispatcher = Dispatcher::new(
            channel,
            HandlerRef::clone(&self.handler),
            self.bus.clone(),
            &self.cfg,
        );
        let result = dispatcher.run(self.token.clone()).await;

        signal_task.abort();
        result
    }

    /// Subscribes to the bus and forwards events to the subscriber set
    /// (fire-and-forget). Called once at build time.
    pub(crate) fn spawn_subscriber_listener(bus: &Bus, subs: &Arc<SubscriberSet>) {
        let mut rx = bus.subscribe();
        let set = Arc::clone(subs);
        tokio::spawn(async move {
            while let Ok(ev) = rx.recv().await {
                set.emit(&ev);
            }
        });
    }

    /// Cancels the shutdown token when a termination signal arrives.
    fn spawn_signal_listener(&self) -> tokio::task::JoinHandle<()> {
        let token = self.token.clone();
        tokio::spawn(async move {
            if shutdown::wait_for_shutdown_signal().await.is_ok() {
                token.cancel();
            }
        })
    }
}
