use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a published message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as delivered to subscribers.
///
/// The payload is the JSON body; routing information travels alongside it
/// so consumers can log where a message came from without decoding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this delivery's message. Redeliveries keep it.
    pub message_id: MessageId,

    /// The exchange the message was published to.
    pub exchange: String,

    /// The routing key (e.g., "product.creating").
    pub routing_key: String,

    /// When the message was published.
    pub timestamp: DateTime<Utc>,

    /// The JSON body.
    pub payload: serde_json::Value,

    /// Transport headers.
    pub headers: HashMap<String, String>,
}

impl Message {
    /// Creates a new message builder.
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }
}

/// Builder for constructing messages.
#[derive(Debug, Default)]
pub struct MessageBuilder {
    exchange: Option<String>,
    routing_key: Option<String>,
    payload: Option<serde_json::Value>,
    headers: HashMap<String, String>,
}

impl MessageBuilder {
    /// Sets the exchange.
    pub fn exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Sets the routing key.
    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    /// Sets the payload from a raw JSON value.
    pub fn payload_raw(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Adds a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Tries to build the message, returning None if required fields are
    /// missing. The message gets a fresh ID and the current time.
    pub fn try_build(self) -> Option<Message> {
        Some(Message {
            message_id: MessageId::new(),
            exchange: self.exchange?,
            routing_key: self.routing_key?,
            timestamp: Utc::now(),
            payload: self.payload?,
            headers: self.headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_new_creates_unique_ids() {
        assert_ne!(MessageId::new(), MessageId::new());
    }

    #[test]
    fn message_builder() {
        let payload = serde_json::json!({"product_id": 7});

        let message = Message::builder()
            .exchange("products")
            .routing_key("product.deleted")
            .payload_raw(payload.clone())
            .header("content-type", "application/json")
            .try_build()
            .unwrap();

        assert_eq!(message.exchange, "products");
        assert_eq!(message.routing_key, "product.deleted");
        assert_eq!(message.payload, payload);
        assert_eq!(
            message.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn message_builder_try_build_returns_none_on_missing_fields() {
        assert!(Message::builder().try_build().is_none());
        assert!(
            Message::builder()
                .exchange("products")
                .payload_raw(serde_json::json!({}))
                .try_build()
                .is_none()
        );
    }
}
