//! # Runtime events emitted by the dispatcher and worker units.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Delivery events**: intake and admission (received, spawn rejected)
//! - **Worker events**: per-message execution flow (started, stopped, failed)
//! - **Acknowledgment events**: outcome applied on the channel (acked,
//!   nacked, dropped)
//! - **Shutdown events**: drain lifecycle (requested, completed, exceeded)
//!
//! The [`Event`] struct carries additional metadata such as the delivery tag,
//! the worker id, and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore the exact order when events are
//! observed out of order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (panic message), `at`, `seq`.
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (e.g. "full", "closed"), `at`, `seq`.
    SubscriberOverflow,

    // === Delivery intake events ===
    /// A delivery was received by the dispatch loop.
    ///
    /// Sets: `tag`, `at`, `seq`.
    DeliveryReceived,

    /// Worker admission was rejected (in-flight cap reached); the delivery
    /// was immediately Nacked with `requeue=true`.
    ///
    /// Sets: `tag`, `reason`, `at`, `seq`.
    SpawnRejected,

    // === Worker lifecycle events ===
    /// Worker began processing its delivery.
    ///
    /// Sets: `worker`, `tag`, `at`, `seq`.
    WorkerStarted,

    /// Worker finished successfully; an Ack was submitted to the relay.
    ///
    /// Sets: `worker`, `tag`, `at`, `seq`.
    WorkerStopped,

    /// Worker's handler failed or panicked; a Nack was submitted.
    ///
    /// Sets: `worker`, `tag`, `reason`, `requeue`, `at`, `seq`.
    WorkerFailed,

    // === Acknowledgment events ===
    /// Positive acknowledgment was applied on the broker channel.
    ///
    /// Sets: `worker`, `tag`, `at`, `seq`.
    Acked,

    /// Negative acknowledgment was applied on the broker channel.
    ///
    /// Sets: `worker`, `tag`, `requeue`, `at`, `seq`.
    Nacked,

    /// An ack/nack could not be applied (channel already closed or failing).
    ///
    /// Non-fatal: the broker redelivers the message after its own timeout.
    ///
    /// Sets: `worker`, `tag`, `reason`, `at`, `seq`.
    AckDropped,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed or token cancelled).
    ///
    /// Sets: `at`, `seq`.
    ShutdownRequested,

    /// Every in-flight worker reached a terminal status; drain is complete.
    ///
    /// Sets: `at`, `seq`.
    DrainCompleted,

    /// Drain window exceeded; some workers were still in flight.
    ///
    /// Sets: `reason` (stuck worker labels), `at`, `seq`.
    GraceExceeded,

    /// Broker channel was closed; the runtime is fully stopped.
    ///
    /// Sets: `at`, `seq`.
    ChannelClosed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Delivery tag, if applicable.
    pub tag: Option<u64>,
    /// Worker id, if applicable.
    pub worker: Option<u64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Requeue flag carried by Nack-related events.
    pub requeue: Option<bool>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            tag: None,
            worker: None,
            reason: None,
            requeue: None,
        }
    }

    /// Attaches a delivery tag.
    #[inline]
    pub fn with_tag(mut self, tag: u64) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Attaches a worker id.
    #[inline]
    pub fn with_worker(mut self, worker: u64) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a requeue flag.
    #[inline]
    pub fn with_requeue(mut self, requeue: bool) -> Self {
        self.requeue = Some(requeue);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::DeliveryReceived);
        let b = Event::new(EventKind::DeliveryReceived);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_set_fields() {
        let ev = Event::new(EventKind::WorkerFailed)
            .with_tag(7)
            .with_worker(3)
            .with_reason("boom")
            .with_requeue(false);
        assert_eq!(ev.tag, Some(7));
        assert_eq!(ev.worker, Some(3));
        assert_eq!(ev.reason.as_deref(), Some("boom"));
        assert_eq!(ev.requeue, Some(false));
    }
}
