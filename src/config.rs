//! # Global runtime configuration.
//!
//! Provides [`Config`] — centralized settings for the consumer runtime and
//! the AMQP adapter.
//!
//! Config is used in two ways:
//! 1. **Consumer creation**: `Consumer::builder(config)`
//! 2. **Broker bootstrap**: `AmqpChannel::connect(&config)` /
//!    `AmqpPublisher::connect(&config)`
//!
//! ## Sentinel values
//! - `max_in_flight = 0` → unlimited (no admission cap on spawned workers)
//! - `grace = 0s` → unbounded drain (shutdown waits for every worker)
//! - `prefetch = 0` → no credit limit requested from the broker

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Global configuration for the consumer runtime.
///
/// ## Field semantics
/// - `exchange`: direct exchange the queue is bound to
/// - `queue` / `routing_key`: `None` → default to the exchange name
///   (mirrors the broker-side convention for single-queue topologies)
/// - `prefetch`: broker credit — max unacknowledged deliveries in flight
/// - `requeue_on_failure`: Nack requeue flag applied when a handler fails
/// - `max_in_flight`: in-process admission cap (`0` = unlimited; the broker
///   prefetch is the primary bound)
/// - `grace`: max wait for in-flight workers during shutdown (`0s` = forever)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct Config {
    /// Broker host name.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Broker username.
    pub username: String,
    /// Broker password.
    pub password: String,
    /// Heartbeat interval in seconds, negotiated at connect time.
    ///
    /// Kept short so heartbeats keep flowing while workers simulate
    /// long-running jobs; the control task never blocks on worker completion.
    pub heartbeat: u16,

    /// Exchange name (direct exchange, durable).
    pub exchange: String,
    /// Queue name; `None` → exchange name.
    pub queue: Option<String>,
    /// Routing key; `None` → exchange name.
    pub routing_key: Option<String>,

    /// Prefetch credit requested via `basic.qos` (`0` = unlimited).
    pub prefetch: u16,
    /// Whether handler failures Nack with `requeue=true`.
    ///
    /// Default `false`: a deterministically failing message that is requeued
    /// immediately becomes a hot redelivery loop.
    pub requeue_on_failure: bool,
    /// In-process worker admission cap (`0` = unlimited).
    pub max_in_flight: usize,
    /// Shutdown drain window (`0s` = wait indefinitely).
    pub grace: Duration,
    /// Capacity of the event bus broadcast ring buffer.
    pub bus_capacity: usize,
}

impl Config {
    /// Builds a config from environment variables.
    ///
    /// Required: `EXCHANGE`, `RABBITMQ_HOST`, `RABBITMQ_USERNAME`,
    /// `RABBITMQ_PASSWORD`.
    ///
    /// Optional: `QUEUE`, `ROUTING_KEY` (default to the exchange name),
    /// `RABBITMQ_PORT`, `PREFETCH_COUNT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self {
            exchange: require("EXCHANGE")?,
            host: require("RABBITMQ_HOST")?,
            username: require("RABBITMQ_USERNAME")?,
            password: require("RABBITMQ_PASSWORD")?,
            ..Self::default()
        };
        if let Ok(queue) = env::var("QUEUE") {
            cfg.queue = Some(queue);
        }
        if let Ok(key) = env::var("ROUTING_KEY") {
            cfg.routing_key = Some(key);
        }
        if let Ok(port) = env::var("RABBITMQ_PORT") {
            cfg.port = parse("RABBITMQ_PORT", &port)?;
        }
        if let Ok(prefetch) = env::var("PREFETCH_COUNT") {
            cfg.prefetch = parse("PREFETCH_COUNT", &prefetch)?;
        }
        Ok(cfg)
    }

    /// Queue name, defaulting to the exchange name.
    #[inline]
    pub fn queue(&self) -> &str {
        self.queue.as_deref().unwrap_or(&self.exchange)
    }

    /// Routing key, defaulting to the exchange name.
    #[inline]
    pub fn routing_key(&self) -> &str {
        self.routing_key.as_deref().unwrap_or(&self.exchange)
    }

    /// Returns the drain window as an `Option`.
    ///
    /// - `None` → unbounded drain (a hung handler blocks shutdown)
    /// - `Some(d)` → shutdown fails with `GraceExceeded` after `d`
    #[inline]
    pub fn grace_window(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns the in-process admission cap as an `Option`.
    #[inline]
    pub fn in_flight_limit(&self) -> Option<usize> {
        if self.max_in_flight == 0 {
            None
        } else {
            Some(self.max_in_flight)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `host = "localhost"`, `port = 5672`, `username/password = "guest"`
    /// - `heartbeat = 5s`
    /// - `exchange = "jobs"`, queue/routing key follow the exchange
    /// - `prefetch = 1` (at most one unacked delivery in flight)
    /// - `requeue_on_failure = false`
    /// - `max_in_flight = 0` (unlimited; prefetch is the real bound)
    /// - `grace = 0s` (unbounded drain)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            heartbeat: 5,
            exchange: "jobs".to_string(),
            queue: None,
            routing_key: None,
            prefetch: 1,
            requeue_on_failure: false,
            max_in_flight: 0,
            grace: Duration::ZERO,
            bus_capacity: 1024,
        }
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn parse<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_and_routing_key_follow_exchange() {
        let cfg = Config {
            exchange: "backups".into(),
            ..Config::default()
        };
        assert_eq!(cfg.queue(), "backups");
        assert_eq!(cfg.routing_key(), "backups");
    }

    #[test]
    fn explicit_queue_wins() {
        let cfg = Config {
            exchange: "backups".into(),
            queue: Some("standard".into()),
            routing_key: Some("standard_key".into()),
            ..Config::default()
        };
        assert_eq!(cfg.queue(), "standard");
        assert_eq!(cfg.routing_key(), "standard_key");
    }

    #[test]
    fn zero_sentinels_map_to_none() {
        let cfg = Config::default();
        assert!(cfg.grace_window().is_none());
        assert!(cfg.in_flight_limit().is_none());
        assert_eq!(cfg.bus_capacity_clamped(), 1024);
    }
}
