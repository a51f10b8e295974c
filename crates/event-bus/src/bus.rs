use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{Message, Result};

/// An exclusive subscription queue.
///
/// Messages routed to the binding are buffered until received. Dropping the
/// subscription deletes the queue; the bus stops routing to it on the next
/// publish.
#[derive(Debug)]
pub struct Subscription {
    exchange: String,
    pattern: String,
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl Subscription {
    /// Wraps the receiving half of a queue bound to `exchange` with `pattern`.
    pub fn new(
        exchange: impl Into<String>,
        pattern: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Message>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            pattern: pattern.into(),
            receiver,
        }
    }

    /// Waits for the next message. Returns None once the bus is gone.
    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }

    /// Returns a message if one is already queued.
    pub fn try_recv(&mut self) -> Option<Message> {
        self.receiver.try_recv().ok()
    }

    /// The exchange this subscription is bound to.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The binding pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Stream for Subscription {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.receiver.poll_recv(cx)
    }
}

/// Core trait for message bus implementations.
///
/// Publishing is fire-and-forget. Subscriptions are exclusive: each one
/// receives its own copy of every matching message. Handlers get no
/// acknowledgement or redelivery; a message is consumed once received.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a JSON payload to `exchange` with `routing_key`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<()>;

    /// Binds a new exclusive queue to `exchange` with a topic `pattern`.
    async fn subscribe(&self, exchange: &str, pattern: &str) -> Result<Subscription>;
}

/// Extension trait providing convenience methods for buses.
#[async_trait]
pub trait EventBusExt: EventBus {
    /// Serializes `payload` and publishes it.
    async fn publish_json<T>(&self, exchange: &str, routing_key: &str, payload: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(payload)?;
        self.publish(exchange, routing_key, value).await
    }
}

impl<T: EventBus + ?Sized> EventBusExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryEventBus;
    use futures_util::StreamExt;

    #[derive(Serialize)]
    struct Deleted {
        product_id: i32,
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        let bus = InMemoryEventBus::new();
        let sub = bus.subscribe("products", "product.*").await.unwrap();

        bus.publish_json("products", "product.deleted", &Deleted { product_id: 1 })
            .await
            .unwrap();
        bus.publish_json("products", "product.updating", &Deleted { product_id: 2 })
            .await
            .unwrap();

        let keys: Vec<String> = sub.take(2).map(|m| m.routing_key).collect().await;
        assert_eq!(keys, vec!["product.deleted", "product.updating"]);
    }
}
