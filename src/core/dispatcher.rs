//! # Dispatch loop: the control task that owns the broker channel.
//!
//! The [`Dispatcher`] is the only place in the runtime that touches the
//! [`BrokerChannel`]. It runs three phases:
//!
//! ```text
//! Accepting ──(token cancelled / stream end)──► Draining ──► Closed
//!
//! Accepting:
//!   select (biased):
//!     ├─► relay request  → apply ack/nack on the channel, settle registry
//!     ├─► token          → stop intake, begin drain
//!     ├─► worker joined  → reap finished task
//!     └─► delivery       → admit → spawn WorkerUnit (never awaited inline)
//!                          └─ rejected → Nack(requeue=true) + SpawnRejected
//!
//! Draining:
//!   apply remaining relay requests, join workers, until registry empty
//!   (optionally bounded by a grace window → GraceExceeded)
//!
//! Closed:
//!   channel.close() → ChannelClosed (reached on the grace-exceeded path
//!   too; the stuck deliveries stay unacked and are redelivered)
//! ```
//!
//! ## Rules
//! - The control task never blocks on worker completion; it suspends only on
//!   the select over (relay | token | join | recv).
//! - Relay requests are drained with priority so acks are never starved by
//!   fresh deliveries — this is what keeps the broker's credit loop moving.
//! - Ack/nack failures are published as `AckDropped` and are non-fatal
//!   (at-least-once: the broker redelivers unacked messages). `recv` errors
//!   are fatal.
//! - Cancellation stops intake only; in-flight workers always finish.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::broker::{BrokerChannel, Delivery};
use crate::config::Config;
use crate::core::registry::{WorkerRegistry, WorkerStatus};
use crate::core::relay::{AckOutcome, AckRelay, AckRequest};
use crate::core::worker::WorkerUnit;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::handlers::HandlerRef;

/// Outcome of one turn of the accept loop.
enum Step {
    Apply(AckRequest),
    Delivery(Option<Delivery>),
    Reaped,
    Shutdown,
}

/// Control task driving one broker channel.
pub(crate) struct Dispatcher<C> {
    channel: C,
    handler: HandlerRef,
    bus: Bus,
    relay: AckRelay,
    rx: mpsc::UnboundedReceiver<AckRequest>,
    registry: WorkerRegistry,
    workers: JoinSet<()>,
    requeue_on_failure: bool,
    grace: Option<std::time::Duration>,
}

impl<C: BrokerChannel> Dispatcher<C> {
    pub(crate) fn new(channel: C, handler: HandlerRef, bus: Bus, cfg: &Config) -> Self {
        let (relay, rx) = AckRelay::channel();
        Self {
            channel,
            handler,
            bus,
            relay,
            rx,
            registry: WorkerRegistry::new(cfg.in_flight_limit()),
            workers: JoinSet::new(),
            requeue_on_failure: cfg.requeue_on_failure,
            grace: cfg.grace_window(),
        }
    }

    /// Runs the pipeline until the token fires or the consume stream ends,
    /// then drains in-flight workers and closes the channel.
    pub(crate) async fn run(mut self, token: CancellationToken) -> Result<(), RuntimeError> {
        self.accept(&token).await?;

        let drained = self.drain().await;
        if drained.is_ok() {
            self.bus.publish(Event::new(EventKind::DrainCompleted));
        }

        // Close even when the grace window was exceeded: the stuck
        // deliveries stay unacked and the broker redelivers them.
        let closed = self.channel.close().await;
        if closed.is_ok() {
            self.bus.publish(Event::new(EventKind::ChannelClosed));
        }
        drained?;
        closed
    }

    /// Accepting phase: receive deliveries and fan them out.
    async fn accept(&mut self, token: &CancellationToken) -> Result<(), RuntimeError> {
        loop {
            // The select yields a Step instead of acting inline: branch
            // futures borrow disjoint fields, the follow-up needs all of
            // them. Every branch future is cancel-safe.
            let step = tokio::select! {
                biased;
                Some(req) = self.rx.recv() => Step::Apply(req),
                _ = token.cancelled() => Step::Shutdown,
                _ = self.workers.join_next(), if !self.workers.is_empty() => Step::Reaped,
                res = self.channel.recv() => Step::Delivery(res?),
            };
            match step {
                Step::Apply(req) => self.apply(req).await,
                Step::Delivery(Some(delivery)) => self.dispatch(delivery).await,
                Step::Delivery(None) => return Ok(()),
                Step::Reaped => {}
                Step::Shutdown => {
                    self.bus.publish(Event::new(EventKind::ShutdownRequested));
                    return Ok(());
                }
            }
        }
    }

    /// Spawns a worker unit for the delivery, or Nacks it back on rejection.
    async fn dispatch(&mut self, delivery: Delivery) {
        let tag = delivery.tag;
        self.bus
            .publish(Event::new(EventKind::DeliveryReceived).with_tag(tag));

        match self.registry.admit(tag) {
            Some(id) => {
                let worker = WorkerUnit {
                    id,
                    delivery,
                    handler: HandlerRef::clone(&self.handler),
                    relay: self.relay.clone(),
                    bus: self.bus.clone(),
                    requeue_on_failure: self.requeue_on_failure,
                };
                self.workers.spawn(worker.run());
            }
            None => {
                // Rejected deliveries go straight back to the queue so the
                // job is not lost.
                self.bus.publish(
                    Event::new(EventKind::SpawnRejected)
                        .with_tag(tag)
                        .with_reason(format!(
                            "in-flight cap reached: {} running",
                            self.registry.len()
                        )),
                );
                if let Err(e) = self.channel.nack(tag, true).await {
                    self.publish_ack_dropped(None, tag, &e);
                }
            }
        }
    }

    /// Applies one relayed acknowledgment on the channel and settles the
    /// worker's registry entry.
    async fn apply(&mut self, req: AckRequest) {
        let (status, result) = match req.outcome {
            AckOutcome::Ack => (WorkerStatus::Completed, self.channel.ack(req.tag).await),
            AckOutcome::Nack { requeue } => (
                WorkerStatus::Failed,
                self.channel.nack(req.tag, requeue).await,
            ),
        };
        self.registry.settle(req.worker, status);

        match result {
            Ok(()) => {
                let ev = match req.outcome {
                    AckOutcome::Ack => Event::new(EventKind::Acked),
                    AckOutcome::Nack { requeue } => {
                        Event::new(EventKind::Nacked).with_requeue(requeue)
                    }
                };
                self.bus.publish(ev.with_worker(req.worker).with_tag(req.tag));
            }
            Err(e) => self.publish_ack_dropped(Some(req.worker), req.tag, &e),
        }
    }

    /// Draining phase: settle every in-flight worker, optionally bounded by
    /// the grace window.
    async fn drain(&mut self) -> Result<(), RuntimeError> {
        match self.grace {
            None => {
                self.drain_all().await;
                Ok(())
            }
            Some(grace) => match tokio::time::timeout(grace, self.drain_all()).await {
                Ok(()) => Ok(()),
                Err(_) => {
                    let stuck = self.registry.stuck_labels();
                    self.bus.publish(
                        Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")),
                    );
                    Err(RuntimeError::GraceExceeded { grace, stuck })
                }
            },
        }
    }

    /// Waits until every registered worker has had its ack request applied.
    ///
    /// A handler that never returns blocks this loop indefinitely — the
    /// drain is cooperative, there is no preemption.
    async fn drain_all(&mut self) {
        while !self.registry.is_empty() {
            let req = tokio::select! {
                biased;
                Some(req) = self.rx.recv() => Some(req),
                _ = self.workers.join_next(), if !self.workers.is_empty() => None,
            };
            if let Some(req) = req {
                self.apply(req).await;
            }
        }
        while self.workers.join_next().await.is_some() {}
    }

    fn publish_ack_dropped(&self, worker: Option<u64>, tag: u64, err: &RuntimeError) {
        let mut ev = Event::new(EventKind::AckDropped)
            .with_tag(tag)
            .with_reason(err.to_string());
        if let Some(worker) = worker {
            ev = ev.with_worker(worker);
        }
        self.bus.publish(ev);
    }
}
