//! # Ack relay: many-producer/single-consumer acknowledgment handoff.
//!
//! Worker units finish on arbitrary runtime threads, but the broker channel
//! may only be driven by the control task. The [`AckRelay`] is the one
//! permitted concurrent-write surface: any worker may [`submit`] an
//! [`AckRequest`] without blocking, and the control task alone drains the
//! receiving end and performs the protocol-level ack/nack.
//!
//! ```text
//! Worker 1 ──┐
//! Worker 2 ──┼── submit(AckRequest) ──► [unbounded mpsc] ──► control task
//! Worker N ──┘      (non-blocking)                            ──► channel.ack/nack
//! ```
//!
//! Requests carry the delivery tag and may arrive out of delivery order;
//! the broker tolerates out-of-order acks by tag, so no reordering is done.

use tokio::sync::mpsc;

/// Terminal outcome for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Positive acknowledgment.
    Ack,
    /// Negative acknowledgment.
    Nack {
        /// Whether the broker should return the message to the queue.
        requeue: bool,
    },
}

/// One acknowledgment scheduled to run on the control task.
///
/// Consumed exactly once by the control task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckRequest {
    /// Id of the worker that produced the outcome.
    pub worker: u64,
    /// Delivery tag the outcome applies to.
    pub tag: u64,
    /// Ack or Nack.
    pub outcome: AckOutcome,
}

/// Submission side of the relay. Cheap to clone; one clone per worker.
#[derive(Clone, Debug)]
pub struct AckRelay {
    tx: mpsc::UnboundedSender<AckRequest>,
}

impl AckRelay {
    /// Creates a relay pair: the cloneable submission handle and the
    /// receiver drained by the control task.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AckRequest>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Schedules an acknowledgment to run on the control task.
    ///
    /// Never blocks; bounded only by memory (in practice by the prefetch
    /// credit, which caps in-flight deliveries). If the control task is
    /// already gone the request is dropped — the broker will redeliver the
    /// unacked message.
    pub fn submit(&self, req: AckRequest) {
        let _ = self.tx.send(req);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn submit_is_fifo_per_producer() {
        let (relay, mut rx) = AckRelay::channel();
        for tag in [3u64, 1, 2] {
            relay.submit(AckRequest {
                worker: tag,
                tag,
                outcome: AckOutcome::Ack,
            });
        }
        let got: Vec<u64> = [rx.recv().await, rx.recv().await, rx.recv().await]
            .into_iter()
            .map(|r| r.unwrap().tag)
            .collect();
        assert_eq!(got, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn submit_after_receiver_drop_is_silent() {
        let (relay, rx) = AckRelay::channel();
        drop(rx);
        relay.submit(AckRequest {
            worker: 1,
            tag: 1,
            outcome: AckOutcome::Nack { requeue: false },
        });
    }
}
