//! # Worker unit: one delivery, one handler invocation, one ack request.
//!
//! A [`WorkerUnit`] is spawned per accepted delivery and runs independently
//! of the dispatch loop. It never touches the broker channel; its only route
//! back to protocol state is the [`AckRelay`].
//!
//! ## Event flow
//! ```text
//! WorkerStarted → handler.process(body) → Ok   → submit Ack   → WorkerStopped
//!                                       → Err  → submit Nack  → WorkerFailed
//!                                       → panic→ submit Nack  → WorkerFailed
//! ```
//!
//! ## Rules
//! - Exactly **one** ack request is submitted per delivery, on every path —
//!   including a panicking handler (caught via `catch_unwind`).
//! - Workers share nothing with each other; the relay sender and the event
//!   bus are the only handles crossing the task boundary.

use futures::FutureExt;

use crate::broker::Delivery;
use crate::core::relay::{AckOutcome, AckRelay, AckRequest};
use crate::error::HandlerError;
use crate::events::{Bus, Event, EventKind};
use crate::handlers::HandlerRef;

/// Independent execution unit for one delivery.
pub struct WorkerUnit {
    /// Worker id assigned by the registry.
    pub id: u64,
    /// The delivery to process; consumed exactly once.
    pub delivery: Delivery,
    /// Business logic capability.
    pub handler: HandlerRef,
    /// Route back to the control task.
    pub relay: AckRelay,
    /// Event bus for start/end observability.
    pub bus: Bus,
    /// Requeue flag applied when the handler fails.
    pub requeue_on_failure: bool,
}

impl WorkerUnit {
    /// Processes the delivery and submits exactly one terminal ack request.
    pub async fn run(self) {
        let tag = self.delivery.tag;
        self.bus.publish(
            Event::new(EventKind::WorkerStarted)
                .with_worker(self.id)
                .with_tag(tag),
        );

        let fut = self.handler.process(self.delivery.body);
        let result = match std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            Ok(res) => res,
            Err(panic_err) => {
                let info = {
                    let any = &*panic_err;
                    if let Some(msg) = any.downcast_ref::<&'static str>() {
                        (*msg).to_string()
                    } else if let Some(msg) = any.downcast_ref::<String>() {
                        msg.clone()
                    } else {
                        "unknown panic".to_string()
                    }
                };
                Err(HandlerError::Panicked { error: info })
            }
        };

        match result {
            Ok(()) => {
                self.relay.submit(AckRequest {
                    worker: self.id,
                    tag,
                    outcome: AckOutcome::Ack,
                });
                self.bus.publish(
                    Event::new(EventKind::WorkerStopped)
                        .with_worker(self.id)
                        .with_tag(tag),
                );
            }
            Err(e) => {
                self.relay.submit(AckRequest {
                    worker: self.id,
                    tag,
                    outcome: AckOutcome::Nack {
                        requeue: self.requeue_on_failure,
                    },
                });
                self.bus.publish(
                    Event::new(EventKind::WorkerFailed)
                        .with_worker(self.id)
                        .with_tag(tag)
                        .with_requeue(self.requeue_on_failure)
                        .with_reason(e.to_string()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::handlers::HandlerFn;

    fn unit(handler: HandlerRef, relay: AckRelay) -> WorkerUnit {
        WorkerUnit {
            id: 1,
            delivery: Delivery {
                tag: 42,
                body: b"job".to_vec(),
            },
            handler,
            relay,
            bus: Bus::new(16),
            requeue_on_failure: false,
        }
    }

    #[tokio::test]
    async fn success_submits_ack() {
        let (relay, mut rx) = AckRelay::channel();
        let handler: HandlerRef = HandlerFn::arc(|_body| async { Ok(()) });
        unit(handler, relay).run().await;

        let req = rx.recv().await.unwrap();
        assert_eq!(req.tag, 42);
        assert_eq!(req.outcome, AckOutcome::Ack);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_submits_nack() {
        let (relay, mut rx) = AckRelay::channel();
        let handler: HandlerRef =
            HandlerFn::arc(|_body| async { Err(HandlerError::fail("boom")) });
        unit(handler, relay).run().await;

        let req = rx.recv().await.unwrap();
        assert_eq!(req.outcome, AckOutcome::Nack { requeue: false });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn panic_is_caught_and_submits_nack() {
        let (relay, mut rx) = AckRelay::channel();
        let handler: HandlerRef = HandlerFn::arc(|_body| async { panic!("handler blew up") });
        unit(handler, relay).run().await;

        let req = rx.recv().await.unwrap();
        assert_eq!(req.outcome, AckOutcome::Nack { requeue: false });
    }

    #[tokio::test]
    async fn failure_events_carry_reason() {
        let (relay, _rx) = AckRelay::channel();
        let bus = Bus::new(16);
        let mut events = bus.subscribe();
        let handler: HandlerRef =
            HandlerFn::arc(|_body| async { Err(HandlerError::fail("decode error")) });

        let mut w = unit(handler, relay);
        w.bus = bus;
        w.run().await;

        let started = events.recv().await.unwrap();
        assert_eq!(started.kind, EventKind::WorkerStarted);
        let failed = events.recv().await.unwrap();
        assert_eq!(failed.kind, EventKind::WorkerFailed);
        assert!(failed.reason.as_deref().unwrap().contains("decode error"));
    }

    #[tokio::test]
    async fn shared_state_goes_through_explicit_arc() {
        let (relay, mut rx) = AckRelay::channel();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_in_handler = Arc::clone(&seen);
        let handler: HandlerRef = HandlerFn::arc(move |body| {
            let seen = Arc::clone(&seen_in_handler);
            async move {
                seen.lock().unwrap().push(body);
                Ok(())
            }
        });
        unit(handler, relay).run().await;

        rx.recv().await.unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), &[b"job".to_vec()]);
    }
}
