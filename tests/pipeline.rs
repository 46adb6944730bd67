//! End-to-end pipeline tests against the in-memory broker.
//!
//! Each test drives a full `Consumer` run and asserts on the protocol
//! operations the broker double observed.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jobpump::{
    BrokerChannel, ChannelOp, Config, Consumer, Delivery, EventKind, HandlerError, HandlerFn,
    HandlerRef, MemoryBroker, RuntimeError,
};

fn config() -> Config {
    Config {
        exchange: "test-jobs".into(),
        ..Config::default()
    }
}

fn consumer_with_handler(handler: HandlerRef) -> Consumer {
    Consumer::builder(config()).with_handler(handler).build()
}

/// Channel double whose ack/nack always fail, as a closed or broken channel
/// would mid-run.
struct RefusingAckChannel {
    pending: VecDeque<Delivery>,
}

#[async_trait]
impl BrokerChannel for RefusingAckChannel {
    async fn recv(&mut self) -> Result<Option<Delivery>, RuntimeError> {
        Ok(self.pending.pop_front())
    }

    async fn ack(&mut self, tag: u64) -> Result<(), RuntimeError> {
        Err(RuntimeError::Channel(format!("ack refused for tag {tag}")))
    }

    async fn nack(&mut self, tag: u64, _requeue: bool) -> Result<(), RuntimeError> {
        Err(RuntimeError::Channel(format!("nack refused for tag {tag}")))
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// Every delivery ends in exactly one terminal outcome, and the channel is
/// closed only afterwards.
#[tokio::test]
async fn every_delivery_gets_exactly_one_outcome() {
    let broker = MemoryBroker::new(0);
    for i in 0..5 {
        broker.publish(format!("job-{i}"));
    }
    broker.finish();

    // Builder default handler accepts everything.
    let consumer = Consumer::builder(config()).build();
    consumer.run(broker.channel()).await.unwrap();

    let mut acked = broker.acked();
    acked.sort_unstable();
    assert_eq!(acked, vec![1, 2, 3, 4, 5]);
    assert!(broker.nacked().is_empty());
    assert_eq!(broker.ops().last(), Some(&ChannelOp::Close));
}

/// With 100 workers in flight, all protocol calls still come from the one
/// control task: the broker double records zero overlapping entries.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn channel_is_never_touched_concurrently() {
    let broker = MemoryBroker::new(0);
    for i in 0..100 {
        broker.publish(format!("job-{i}"));
    }
    broker.finish();

    let handler: HandlerRef = HandlerFn::arc(|body: Vec<u8>| async move {
        // Stagger completions so acks arrive from many worker tasks at once.
        let jitter = (body.len() % 7) as u64;
        tokio::time::sleep(Duration::from_millis(5 + jitter)).await;
        Ok(())
    });
    let consumer = consumer_with_handler(handler);
    consumer.run(broker.channel()).await.unwrap();

    assert_eq!(broker.acked().len(), 100);
    assert_eq!(broker.violations(), 0);
}

/// After a shutdown request, the channel is closed strictly after every
/// in-flight worker has been settled.
#[tokio::test]
async fn drain_completes_before_close() {
    let broker = MemoryBroker::new(0);
    for i in 0..5 {
        broker.publish(format!("slow-{i}"));
    }

    let handler: HandlerRef = HandlerFn::arc(|_body: Vec<u8>| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    });
    let consumer = consumer_with_handler(handler);
    let token = consumer.shutdown_token();
    let mut events = consumer.events();

    let channel = broker.channel();
    let run = tokio::spawn(async move { consumer.run(channel).await });

    // Wait until all five workers are processing, then request shutdown.
    let mut started = 0;
    while started < 5 {
        if events.recv().await.unwrap().kind == EventKind::WorkerStarted {
            started += 1;
        }
    }
    token.cancel();
    run.await.unwrap().unwrap();

    let ops = broker.ops();
    assert_eq!(ops.last(), Some(&ChannelOp::Close));
    let acks = ops
        .iter()
        .filter(|op| matches!(op, ChannelOp::Ack(_)))
        .count();
    assert_eq!(acks, 5, "close must come after all five workers settled");
    assert!(broker.is_closed());
}

/// One failing handler invocation Nacks its own delivery and nothing else.
#[tokio::test]
async fn one_failure_does_not_affect_other_deliveries() {
    let broker = MemoryBroker::new(0);
    for i in 1..=5 {
        broker.publish(format!("{i}"));
    }
    broker.finish();

    let handler: HandlerRef = HandlerFn::arc(|body: Vec<u8>| async move {
        if body == b"3" {
            return Err(HandlerError::fail("job 3 is poison"));
        }
        Ok(())
    });
    let consumer = consumer_with_handler(handler);
    consumer.run(broker.channel()).await.unwrap();

    let mut acked = broker.acked();
    acked.sort_unstable();
    assert_eq!(acked, vec![1, 2, 4, 5]);
    assert_eq!(broker.nacked(), vec![(3, false)]);
    assert_eq!(broker.dead_lettered(), vec![3]);
}

/// A panicking handler is indistinguishable from a failing one at the
/// protocol level: its delivery is Nacked and the run continues.
#[tokio::test]
async fn handler_panic_becomes_nack() {
    let broker = MemoryBroker::new(0);
    broker.publish("fine");
    broker.publish("explosive");
    broker.finish();

    let handler: HandlerRef = HandlerFn::arc(|body: Vec<u8>| async move {
        if body == b"explosive" {
            panic!("boom");
        }
        Ok(())
    });
    let consumer = consumer_with_handler(handler);
    consumer.run(broker.channel()).await.unwrap();

    assert_eq!(broker.acked(), vec![1]);
    assert_eq!(broker.nacked(), vec![(2, false)]);
}

/// With prefetch=1 the broker withholds the second delivery until the first
/// is acked: the credit loop, not worker speed, paces intake.
#[tokio::test]
async fn prefetch_credit_paces_intake() {
    let broker = MemoryBroker::new(1);
    broker.publish("first");
    broker.publish("second");
    broker.finish();

    let handler: HandlerRef = HandlerFn::arc(|_body: Vec<u8>| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(())
    });
    let consumer = consumer_with_handler(handler);
    let mut events = consumer.events();
    consumer.run(broker.channel()).await.unwrap();

    let mut history = Vec::new();
    while let Ok(ev) = events.try_recv() {
        history.push(ev);
    }
    let ack_of_first = history
        .iter()
        .find(|e| e.kind == EventKind::Acked && e.tag == Some(1))
        .expect("first delivery acked");
    let intake_of_second = history
        .iter()
        .find(|e| e.kind == EventKind::DeliveryReceived && e.tag == Some(2))
        .expect("second delivery received");
    assert!(
        ack_of_first.seq < intake_of_second.seq,
        "second delivery must wait for the first ack"
    );
}

/// Acks arriving out of delivery order are routed by tag, never misattributed.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn out_of_order_acks_route_by_tag() {
    let broker = MemoryBroker::new(0);
    broker.publish("sleep-300");
    broker.publish("sleep-10");
    broker.publish("sleep-150");
    broker.finish();

    let handler: HandlerRef = HandlerFn::arc(|body: Vec<u8>| async move {
        let ms: u64 = String::from_utf8(body)
            .unwrap()
            .trim_start_matches("sleep-")
            .parse()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    });
    let consumer = consumer_with_handler(handler);
    consumer.run(broker.channel()).await.unwrap();

    assert_eq!(broker.acked(), vec![2, 3, 1]);
}

/// `requeue_on_failure=true` sends a failed delivery back to the queue for
/// redelivery under a fresh tag.
#[tokio::test]
async fn failure_requeue_redelivers() {
    let broker = MemoryBroker::new(1);
    broker.publish("flaky");
    broker.finish();

    let failed_once = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&failed_once);
    let handler: HandlerRef = HandlerFn::arc(move |_body: Vec<u8>| {
        let flag = Arc::clone(&flag);
        async move {
            if !flag.swap(true, Ordering::SeqCst) {
                return Err(HandlerError::fail("transient"));
            }
            Ok(())
        }
    });

    let cfg = Config {
        requeue_on_failure: true,
        ..config()
    };
    let consumer = Consumer::builder(cfg).with_handler(handler).build();
    consumer.run(broker.channel()).await.unwrap();

    assert_eq!(broker.nacked(), vec![(1, true)]);
    assert_eq!(broker.acked(), vec![2]);
    assert!(broker.dead_lettered().is_empty());
}

/// When the in-flight cap rejects a delivery it is Nacked with requeue and
/// eventually processed; nothing is lost.
#[tokio::test]
async fn spawn_rejection_requeues_the_delivery() {
    let broker = MemoryBroker::new(0);
    broker.publish("a");
    broker.publish("b");
    broker.finish();

    let handler: HandlerRef = HandlerFn::arc(|_body: Vec<u8>| async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(())
    });
    let cfg = Config {
        max_in_flight: 1,
        ..config()
    };
    let consumer = Consumer::builder(cfg).with_handler(handler).build();
    consumer.run(broker.channel()).await.unwrap();

    // Both bodies end up acked; the overflow delivery may have bounced any
    // number of times, but every bounce carried the requeue flag.
    assert_eq!(broker.acked().len(), 2);
    let nacked = broker.nacked();
    assert!(!nacked.is_empty(), "second delivery must hit the admission cap");
    assert!(nacked.iter().all(|(_, requeue)| *requeue));
    assert!(broker.dead_lettered().is_empty());
}

/// A channel that refuses acknowledgments does not kill the run: each
/// failure is reported as `AckDropped` and the drain still completes.
#[tokio::test]
async fn refused_acks_are_reported_not_fatal() {
    let channel = RefusingAckChannel {
        pending: VecDeque::from([
            Delivery {
                tag: 1,
                body: b"a".to_vec(),
            },
            Delivery {
                tag: 2,
                body: b"b".to_vec(),
            },
        ]),
    };

    let consumer = Consumer::builder(config()).build();
    let mut events = consumer.events();
    consumer.run(channel).await.unwrap();

    let mut dropped = Vec::new();
    let mut closed = false;
    while let Ok(ev) = events.try_recv() {
        match ev.kind {
            EventKind::AckDropped => dropped.push(ev.tag),
            EventKind::ChannelClosed => closed = true,
            _ => {}
        }
    }
    dropped.sort_unstable();
    assert_eq!(dropped, vec![Some(1), Some(2)]);
    assert!(closed);
}

/// A hung handler trips the grace window: the run fails with the stuck
/// worker listed instead of hanging forever.
#[tokio::test]
async fn grace_window_reports_stuck_workers() {
    let broker = MemoryBroker::new(0);
    broker.publish("wedged");

    let handler: HandlerRef = HandlerFn::arc(|_body: Vec<u8>| async move {
        std::future::pending::<()>().await;
        Ok(())
    });
    let cfg = Config {
        grace: Duration::from_millis(50),
        ..config()
    };
    let consumer = Consumer::builder(cfg).with_handler(handler).build();
    let token = consumer.shutdown_token();
    let mut events = consumer.events();

    let channel = broker.channel();
    let run = tokio::spawn(async move { consumer.run(channel).await });

    while events.recv().await.unwrap().kind != EventKind::WorkerStarted {}
    token.cancel();

    match run.await.unwrap() {
        Err(RuntimeError::GraceExceeded { stuck, .. }) => {
            assert_eq!(stuck, vec!["worker=1 tag=1".to_string()]);
        }
        other => panic!("expected GraceExceeded, got {other:?}"),
    }
    // Even on the grace-exceeded path the channel is closed; the wedged
    // delivery stays unacked for redelivery.
    assert!(broker.is_closed());
    assert_eq!(broker.unacked_len(), 1);
}

/// Workers only ever hand results to the relay; a worker that finishes after
/// the run is over must not be able to corrupt anything.
#[tokio::test]
async fn completed_registry_is_pruned_under_sustained_load() {
    let broker = MemoryBroker::new(1);
    for i in 0..50 {
        broker.publish(format!("{i}"));
    }
    broker.finish();

    let peak = Arc::new(AtomicUsize::new(0));
    let current = Arc::new(AtomicUsize::new(0));
    let (peak_h, current_h) = (Arc::clone(&peak), Arc::clone(&current));
    let handler: HandlerRef = HandlerFn::arc(move |_body: Vec<u8>| {
        let peak = Arc::clone(&peak_h);
        let current = Arc::clone(&current_h);
        async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let consumer = consumer_with_handler(handler);
    consumer.run(broker.channel()).await.unwrap();

    assert_eq!(broker.acked().len(), 50);
    // prefetch=1 means the credit loop never lets two workers overlap.
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}
