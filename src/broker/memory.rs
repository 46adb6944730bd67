//! # In-memory broker with credit-accurate prefetch.
//!
//! [`MemoryBroker`] models the single-queue direct-exchange topology the
//! runtime consumes from, entirely in process. It exists for tests, demos
//! and embedding: the channel it hands out enforces the same flow-control
//! contract a real broker does — a delivery is only produced while the
//! number of unacknowledged tags is below the prefetch credit.
//!
//! ```text
//! publish ──► [queue] ──recv (credit-gated)──► Delivery { tag, body }
//!                ▲                                   │
//!                └── nack(requeue=true) ◄── ack/nack─┘
//! ```
//!
//! ## Instrumentation
//! Every protocol call is recorded as a [`ChannelOp`] and guarded against
//! concurrent entry, so tests can assert:
//! - the exact ack/nack sequence the "broker" observed,
//! - that channel operations were never issued concurrently
//!   ([`MemoryBroker::violations`] stays 0 even with many workers in flight).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::broker::channel::{BrokerChannel, Delivery, Publish};
use crate::error::RuntimeError;

/// A protocol operation observed by the broker double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    /// `basic.ack` for the given tag.
    Ack(u64),
    /// `basic.nack` for the given tag.
    Nack {
        /// Delivery tag.
        tag: u64,
        /// Requeue flag.
        requeue: bool,
    },
    /// Channel close.
    Close,
}

struct State {
    queue: VecDeque<Vec<u8>>,
    unacked: HashMap<u64, Vec<u8>>,
    next_tag: u64,
    finished: bool,
    closed: bool,
    ops: Vec<ChannelOp>,
    dead: Vec<u64>,
}

struct Shared {
    prefetch: usize,
    state: Mutex<State>,
    notify: Notify,
    in_call: AtomicBool,
    violations: AtomicUsize,
}

impl Shared {
    /// Marks entry into a channel method; overlapping entries are recorded
    /// as single-writer violations.
    fn enter(&self) -> CallGuard<'_> {
        if self.in_call.swap(true, Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        CallGuard { shared: self }
    }
}

struct CallGuard<'a> {
    shared: &'a Shared,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.shared.in_call.store(false, Ordering::SeqCst);
    }
}

/// In-memory broker: one durable queue bound to a direct exchange.
///
/// Routing keys are accepted but collapse onto the single bound queue.
/// Cheap to clone; all clones share the same queue and instrumentation.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Creates a broker with the given prefetch credit (`0` = unlimited).
    pub fn new(prefetch: usize) -> Self {
        Self {
            shared: Arc::new(Shared {
                prefetch,
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    unacked: HashMap::new(),
                    next_tag: 0,
                    finished: false,
                    closed: false,
                    ops: Vec::new(),
                    dead: Vec::new(),
                }),
                notify: Notify::new(),
                in_call: AtomicBool::new(false),
                violations: AtomicUsize::new(0),
            }),
        }
    }

    /// Enqueues a message body directly (test/demo convenience).
    pub fn publish(&self, body: impl Into<Vec<u8>>) {
        let mut st = self.shared.state.lock().unwrap();
        st.queue.push_back(body.into());
        drop(st);
        self.shared.notify.notify_waiters();
    }

    /// Marks the stream as finished: once the queue is empty, `recv` returns
    /// `None` instead of waiting for more publishes.
    pub fn finish(&self) {
        self.shared.state.lock().unwrap().finished = true;
        self.shared.notify.notify_waiters();
    }

    /// Hands out the consuming channel endpoint.
    pub fn channel(&self) -> MemoryChannel {
        MemoryChannel {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Hands out a publishing endpoint.
    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            shared: Arc::clone(&self.shared),
        }
    }

    /// All protocol operations observed so far, in call order.
    pub fn ops(&self) -> Vec<ChannelOp> {
        self.shared.state.lock().unwrap().ops.clone()
    }

    /// Tags that were positively acknowledged, in call order.
    pub fn acked(&self) -> Vec<u64> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ChannelOp::Ack(tag) => Some(tag),
                _ => None,
            })
            .collect()
    }

    /// `(tag, requeue)` pairs that were negatively acknowledged, in call order.
    pub fn nacked(&self) -> Vec<(u64, bool)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                ChannelOp::Nack { tag, requeue } => Some((tag, requeue)),
                _ => None,
            })
            .collect()
    }

    /// Tags dropped by `nack(requeue=false)`.
    pub fn dead_lettered(&self) -> Vec<u64> {
        self.shared.state.lock().unwrap().dead.clone()
    }

    /// Number of undelivered messages in the queue.
    pub fn queue_len(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Number of deliveries currently holding credit.
    pub fn unacked_len(&self) -> usize {
        self.shared.state.lock().unwrap().unacked.len()
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().closed
    }

    /// Number of overlapping channel-method entries observed.
    ///
    /// Stays `0` as long as the single-writer discipline holds.
    pub fn violations(&self) -> usize {
        self.shared.violations.load(Ordering::SeqCst)
    }
}

/// Consuming endpoint of a [`MemoryBroker`].
pub struct MemoryChannel {
    shared: Arc<Shared>,
}

#[async_trait]
impl BrokerChannel for MemoryChannel {
    async fn recv(&mut self) -> Result<Option<Delivery>, RuntimeError> {
        let _call = self.shared.enter();
        loop {
            // Created before the state check so a publish/ack between the
            // check and the await cannot be missed.
            let notified = self.shared.notify.notified();
            {
                let mut st = self.shared.state.lock().unwrap();
                if st.closed {
                    return Ok(None);
                }
                let has_credit =
                    self.shared.prefetch == 0 || st.unacked.len() < self.shared.prefetch;
                if has_credit {
                    if let Some(body) = st.queue.pop_front() {
                        st.next_tag += 1;
                        let tag = st.next_tag;
                        st.unacked.insert(tag, body.clone());
                        return Ok(Some(Delivery { tag, body }));
                    }
                }
                if st.finished && st.queue.is_empty() {
                    return Ok(None);
                }
            }
            notified.await;
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), RuntimeError> {
        let _call = self.shared.enter();
        let mut st = self.shared.state.lock().unwrap();
        if st.closed {
            return Err(RuntimeError::Channel("ack on closed channel".into()));
        }
        st.unacked.remove(&tag);
        st.ops.push(ChannelOp::Ack(tag));
        drop(st);
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&mut self, tag: u64, requeue: bool) -> Result<(), RuntimeError> {
        let _call = self.shared.enter();
        let mut st = self.shared.state.lock().unwrap();
        if st.closed {
            return Err(RuntimeError::Channel("nack on closed channel".into()));
        }
        if let Some(body) = st.unacked.remove(&tag) {
            if requeue {
                // Redelivery goes to the head of the queue under a new tag.
                st.queue.push_front(body);
            } else {
                st.dead.push(tag);
            }
        }
        st.ops.push(ChannelOp::Nack { tag, requeue });
        drop(st);
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        let _call = self.shared.enter();
        let mut st = self.shared.state.lock().unwrap();
        st.closed = true;
        st.ops.push(ChannelOp::Close);
        drop(st);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

/// Publishing endpoint of a [`MemoryBroker`].
#[derive(Clone)]
pub struct MemoryPublisher {
    shared: Arc<Shared>,
}

#[async_trait]
impl Publish for MemoryPublisher {
    async fn publish(&self, _routing_key: &str, body: Vec<u8>) -> Result<(), RuntimeError> {
        let mut st = self.shared.state.lock().unwrap();
        if st.closed {
            return Err(RuntimeError::Channel("publish on closed broker".into()));
        }
        st.queue.push_back(body);
        drop(st);
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    #[tokio::test]
    async fn prefetch_withholds_second_delivery_until_ack() {
        let broker = MemoryBroker::new(1);
        broker.publish("a");
        broker.publish("b");
        let mut ch = broker.channel();

        let first = ch.recv().await.unwrap().unwrap();
        assert_eq!(first.tag, 1);

        // Credit exhausted: the next recv must not complete yet.
        assert!(ch.recv().now_or_never().is_none());

        ch.ack(first.tag).await.unwrap();
        let second = ch.recv().await.unwrap().unwrap();
        assert_eq!(second.tag, 2);
        assert_eq!(second.body, b"b");
    }

    #[tokio::test]
    async fn nack_requeue_redelivers_under_new_tag() {
        let broker = MemoryBroker::new(1);
        broker.publish("job");
        let mut ch = broker.channel();

        let first = ch.recv().await.unwrap().unwrap();
        ch.nack(first.tag, true).await.unwrap();

        let redelivered = ch.recv().await.unwrap().unwrap();
        assert_eq!(redelivered.body, b"job");
        assert_ne!(redelivered.tag, first.tag);
    }

    #[tokio::test]
    async fn nack_without_requeue_dead_letters() {
        let broker = MemoryBroker::new(1);
        broker.publish("job");
        let mut ch = broker.channel();

        let d = ch.recv().await.unwrap().unwrap();
        ch.nack(d.tag, false).await.unwrap();

        assert_eq!(broker.dead_lettered(), vec![d.tag]);
        assert_eq!(broker.queue_len(), 0);
    }

    #[tokio::test]
    async fn finish_ends_stream_after_queue_drains() {
        let broker = MemoryBroker::new(0);
        broker.publish("last");
        broker.finish();
        let mut ch = broker.channel();

        assert!(ch.recv().await.unwrap().is_some());
        assert!(ch.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn ack_after_close_is_an_error() {
        let broker = MemoryBroker::new(1);
        broker.publish("job");
        let mut ch = broker.channel();
        let d = ch.recv().await.unwrap().unwrap();

        ch.close().await.unwrap();
        assert!(ch.ack(d.tag).await.is_err());
    }
}
