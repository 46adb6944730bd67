//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//!
//! ## Output format
//! ```text
//! [delivery] tag=1
//! [worker-start] worker=1 tag=1
//! [acked] worker=1 tag=1
//! [worker-failed] worker=2 tag=2 requeue=false err="decode error"
//! [shutdown-requested]
//! [drain-completed]
//! [channel-closed]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Useful for development, debugging and examples. Not intended for
/// production use — implement a custom [`Subscribe`] for structured logging
/// or metrics collection.
#[derive(Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::DeliveryReceived => {
                println!("[delivery] tag={}", fmt(e.tag));
            }
            EventKind::SpawnRejected => {
                println!(
                    "[spawn-rejected] tag={} reason={:?}",
                    fmt(e.tag),
                    e.reason.as_deref().unwrap_or("")
                );
            }
            EventKind::WorkerStarted => {
                println!("[worker-start] worker={} tag={}", fmt(e.worker), fmt(e.tag));
            }
            EventKind::WorkerStopped => {
                println!("[worker-stop] worker={} tag={}", fmt(e.worker), fmt(e.tag));
            }
            EventKind::WorkerFailed => {
                println!(
                    "[worker-failed] worker={} tag={} requeue={} err={:?}",
                    fmt(e.worker),
                    fmt(e.tag),
                    e.requeue.unwrap_or(false),
                    e.reason.as_deref().unwrap_or("")
                );
            }
            EventKind::Acked => {
                println!("[acked] worker={} tag={}", fmt(e.worker), fmt(e.tag));
            }
            EventKind::Nacked => {
                println!(
                    "[nacked] worker={} tag={} requeue={}",
                    fmt(e.worker),
                    fmt(e.tag),
                    e.requeue.unwrap_or(false)
                );
            }
            EventKind::AckDropped => {
                println!(
                    "[ack-dropped] tag={} err={:?}",
                    fmt(e.tag),
                    e.reason.as_deref().unwrap_or("")
                );
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::DrainCompleted => {
                println!("[drain-completed]");
            }
            EventKind::GraceExceeded => {
                println!("[grace-exceeded] stuck={:?}", e.reason.as_deref().unwrap_or(""));
            }
            EventKind::ChannelClosed => {
                println!("[channel-closed]");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                println!("[subscriber] {:?}", e.reason.as_deref().unwrap_or(""));
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

fn fmt(v: Option<u64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
