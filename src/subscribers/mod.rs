//! # Subscriber API: observability fan-out.
//!
//! This module provides the extension point for observing runtime events:
//! - [`Subscribe`] — trait for event handlers (logging, metrics, alerting)
//! - [`SubscriberSet`] — per-subscriber queues + worker tasks with panic and
//!   overflow isolation
//! - [`LogWriter`] — simple stdout subscriber for demos and debugging

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
