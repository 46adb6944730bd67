//! Error types used by the jobpump runtime and task handlers.
//!
//! This module defines three error enums:
//!
//! - [`RuntimeError`] — errors raised by the consumer runtime itself
//!   (connection loss, failed channel operations, exceeded drain window).
//! - [`HandlerError`] — errors raised by a single handler invocation; these
//!   are per-message and never fatal to the runtime.
//! - [`ConfigError`] — invalid or missing configuration input.
//!
//! All types provide `as_label()` returning a short stable snake_case label
//! for logs and metrics.

use std::time::Duration;
use thiserror::Error;

/// Errors produced by the consumer runtime.
///
/// These represent failures of the dispatch pipeline itself, not of an
/// individual message. They terminate [`Consumer::run`](crate::Consumer::run).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Broker connection could not be established.
    #[error("broker connection failed: {0}")]
    Connect(String),

    /// A protocol operation on the broker channel failed mid-run.
    #[error("broker channel error: {0}")]
    Channel(String),

    /// Shutdown drain window was exceeded; some workers remained in flight.
    ///
    /// The stuck deliveries were never acked and will be redelivered by the
    /// broker (at-least-once semantics).
    #[error("drain window {grace:?} exceeded; stuck workers: {stuck:?}")]
    GraceExceeded {
        /// The configured drain window.
        grace: Duration,
        /// `worker=<id> tag=<tag>` labels of workers that did not finish.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use jobpump::RuntimeError;
    ///
    /// let err = RuntimeError::Channel("basic.ack on closed channel".into());
    /// assert_eq!(err.as_label(), "broker_channel_error");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Connect(_) => "broker_connect_failed",
            RuntimeError::Channel(_) => "broker_channel_error",
            RuntimeError::GraceExceeded { .. } => "drain_grace_exceeded",
        }
    }
}

/// Errors produced by a single [`TaskHandler`](crate::TaskHandler) invocation.
///
/// A handler error is terminal for its delivery only: the worker converts it
/// into a Nack and the rest of the pipeline is unaffected.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Handler reported failure for this message.
    #[error("handler failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Handler panicked; the panic was caught by the worker.
    #[error("handler panicked: {error}")]
    Panicked {
        /// Panic payload, stringified.
        error: String,
    },
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        HandlerError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Fail { .. } => "handler_failed",
            HandlerError::Panicked { .. } => "handler_panicked",
        }
    }
}

/// Errors produced while building a [`Config`](crate::Config) from the
/// environment.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required environment variable was absent.
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    /// An environment variable was present but could not be parsed.
    #[error("invalid value for {var}: {value}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_labels_are_stable() {
        let labels = [
            RuntimeError::Connect("refused".into()).as_label(),
            RuntimeError::Channel("ack failed".into()).as_label(),
            RuntimeError::GraceExceeded {
                grace: Duration::from_secs(1),
                stuck: vec![],
            }
            .as_label(),
        ];
        assert_eq!(
            labels,
            [
                "broker_connect_failed",
                "broker_channel_error",
                "drain_grace_exceeded"
            ]
        );
    }
}
