//! # Companion producer facade.
//!
//! [`Publisher`] enqueues work descriptors for the consumer side, over any
//! [`Publish`] capability. Publishing is fire-and-forget; adapters mark the
//! messages persistent so a durable queue keeps them across broker restarts.
//!
//! The default routing key is the exchange name — the single-queue
//! convention the consumer's topology binds with.

use std::sync::Arc;

use crate::broker::Publish;
use crate::error::RuntimeError;

/// Producer handle bound to one exchange.
pub struct Publisher {
    inner: Arc<dyn Publish>,
    routing_key: String,
}

impl Publisher {
    /// Creates a publisher with the given default routing key.
    pub fn new(inner: Arc<dyn Publish>, routing_key: impl Into<String>) -> Self {
        Self {
            inner,
            routing_key: routing_key.into(),
        }
    }

    /// Publishes one message with the default routing key.
    pub async fn publish(&self, body: impl Into<Vec<u8>>) -> Result<(), RuntimeError> {
        self.inner.publish(&self.routing_key, body.into()).await
    }

    /// Publishes one message with an explicit routing key.
    pub async fn publish_to(
        &self,
        routing_key: &str,
        body: impl Into<Vec<u8>>,
    ) -> Result<(), RuntimeError> {
        self.inner.publish(routing_key, body.into()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;

    #[tokio::test]
    async fn publish_lands_in_queue() {
        let broker = MemoryBroker::new(1);
        let publisher = Publisher::new(Arc::new(broker.publisher()), "jobs");

        publisher.publish("file1.jpg").await.unwrap();
        publisher.publish_to("jobs", "file2.jpg").await.unwrap();

        assert_eq!(broker.queue_len(), 2);
    }
}
