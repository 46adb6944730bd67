//! # AMQP 0.9.1 adapter over `lapin`.
//!
//! [`AmqpChannel`] performs the connection bootstrap the runtime needs —
//! connect, declare the durable direct exchange, declare and bind the queue,
//! set the prefetch credit — and then exposes the consume stream as a
//! [`BrokerChannel`].
//!
//! [`AmqpPublisher`] is the producing counterpart: it declares the same
//! exchange and publishes persistent (delivery-mode 2) messages,
//! fire-and-forget.
//!
//! ## Topology
//! - exchange: direct, durable, not auto-deleted
//! - queue: durable, auto-deleted, bound with the configured routing key
//! - `basic.qos(prefetch)` → the broker never grants more unacked
//!   deliveries than the credit allows

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPQueryString, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};

use crate::broker::channel::{BrokerChannel, Delivery, Publish};
use crate::config::Config;
use crate::error::RuntimeError;

fn connect_err(e: lapin::Error) -> RuntimeError {
    RuntimeError::Connect(e.to_string())
}

fn channel_err(e: lapin::Error) -> RuntimeError {
    RuntimeError::Channel(e.to_string())
}

/// Credentials and host go into the URI structurally, never through string
/// interpolation, so reserved characters in a password need no escaping.
fn amqp_uri(cfg: &Config) -> AMQPUri {
    AMQPUri {
        scheme: AMQPScheme::AMQP,
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: cfg.username.clone(),
                password: cfg.password.clone(),
            },
            host: cfg.host.clone(),
            port: cfg.port,
        },
        vhost: "/".to_string(),
        query: AMQPQueryString {
            heartbeat: Some(cfg.heartbeat),
            ..Default::default()
        },
    }
}

async fn open(cfg: &Config) -> Result<(Connection, Channel), RuntimeError> {
    let connection = Connection::connect_uri(
        amqp_uri(cfg),
        ConnectionProperties::default().with_connection_name("jobpump".into()),
    )
    .await
    .map_err(connect_err)?;

    let channel = connection.create_channel().await.map_err(connect_err)?;
    channel
        .exchange_declare(
            &cfg.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(connect_err)?;

    Ok((connection, channel))
}

/// Consuming AMQP endpoint.
///
/// Owned by the dispatcher's control task after construction; all protocol
/// I/O goes through that single owner.
pub struct AmqpChannel {
    connection: Connection,
    channel: Channel,
    consumer: lapin::Consumer,
}

impl AmqpChannel {
    /// Connects, declares the topology and starts consuming.
    pub async fn connect(cfg: &Config) -> Result<Self, RuntimeError> {
        let (connection, channel) = open(cfg).await?;

        channel
            .queue_declare(
                cfg.queue(),
                QueueDeclareOptions {
                    durable: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connect_err)?;
        channel
            .queue_bind(
                cfg.queue(),
                &cfg.exchange,
                cfg.routing_key(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(connect_err)?;
        channel
            .basic_qos(cfg.prefetch, BasicQosOptions::default())
            .await
            .map_err(connect_err)?;

        let consumer = channel
            .basic_consume(
                cfg.queue(),
                "jobpump-consumer",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(connect_err)?;

        Ok(Self {
            connection,
            channel,
            consumer,
        })
    }
}

#[async_trait]
impl BrokerChannel for AmqpChannel {
    async fn recv(&mut self) -> Result<Option<Delivery>, RuntimeError> {
        match self.consumer.next().await {
            None => Ok(None),
            Some(Ok(delivery)) => Ok(Some(Delivery {
                tag: delivery.delivery_tag,
                body: delivery.data,
            })),
            Some(Err(e)) => Err(channel_err(e)),
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), RuntimeError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(channel_err)
    }

    async fn nack(&mut self, tag: u64, requeue: bool) -> Result<(), RuntimeError> {
        self.channel
            .basic_nack(
                tag,
                BasicNackOptions {
                    requeue,
                    ..Default::default()
                },
            )
            .await
            .map_err(channel_err)
    }

    async fn close(&mut self) -> Result<(), RuntimeError> {
        self.connection
            .close(200, "consumer drained")
            .await
            .map_err(channel_err)
    }
}

/// Publishing AMQP endpoint. Messages are marked persistent so they survive
/// a broker restart together with the durable queue.
pub struct AmqpPublisher {
    // Held so the channel outlives this handle.
    _connection: Connection,
    channel: Channel,
    exchange: String,
}

impl AmqpPublisher {
    /// Connects and declares the exchange.
    pub async fn connect(cfg: &Config) -> Result<Self, RuntimeError> {
        let (connection, channel) = open(cfg).await?;
        Ok(Self {
            _connection: connection,
            channel,
            exchange: cfg.exchange.clone(),
        })
    }
}

#[async_trait]
impl Publish for AmqpPublisher {
    async fn publish(&self, routing_key: &str, body: Vec<u8>) -> Result<(), RuntimeError> {
        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("text/plain".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(channel_err)?
            .await
            .map_err(channel_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_passes_credentials_structurally() {
        let cfg = Config {
            username: "job@runner".to_string(),
            password: "p@ss/w:rd".to_string(),
            ..Config::default()
        };
        let uri = amqp_uri(&cfg);
        assert_eq!(uri.authority.userinfo.username, "job@runner");
        assert_eq!(uri.authority.userinfo.password, "p@ss/w:rd");
        assert_eq!(uri.authority.host, "localhost");
        assert_eq!(uri.authority.port, 5672);
        assert_eq!(uri.vhost, "/");
        assert_eq!(uri.query.heartbeat, Some(5));
    }
}
