use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::{
    BusError, Message, Result,
    bus::{EventBus, Subscription},
    topic::{pattern_matches, validate_pattern},
};

struct Binding {
    exchange: String,
    pattern: String,
    sender: mpsc::UnboundedSender<Message>,
}

#[derive(Default)]
struct BusState {
    bindings: Vec<Binding>,
    published: Vec<Message>,
    record: bool,
    failing_exchanges: HashSet<String>,
    duplicate_delivery: bool,
}

/// In-process message bus.
///
/// Routes every published message to all live bindings whose exchange and
/// topic pattern match. Used by the single-process binary and by tests,
/// which can also make publishes fail or have every message delivered twice.
/// Only a bus built with [`recording`](Self::recording) keeps a copy of
/// what was published.
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<RwLock<BusState>>,
}

impl InMemoryEventBus {
    /// Creates a new bus with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus that also keeps every published message for
    /// [`published`](Self::published).
    pub fn recording() -> Self {
        let state = BusState {
            record: true,
            ..BusState::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Makes every publish to `exchange` fail until restored.
    pub async fn fail_publishes_to(&self, exchange: &str) {
        self.state
            .write()
            .await
            .failing_exchanges
            .insert(exchange.to_string());
    }

    /// Undoes [`fail_publishes_to`](Self::fail_publishes_to).
    pub async fn restore_publishes_to(&self, exchange: &str) {
        self.state.write().await.failing_exchanges.remove(exchange);
    }

    /// Delivers every message twice, as an at-least-once transport may.
    pub async fn set_duplicate_delivery(&self, duplicate: bool) {
        self.state.write().await.duplicate_delivery = duplicate;
    }

    /// Returns every message published to `exchange`, oldest first. Empty
    /// unless the bus is recording.
    pub async fn published(&self, exchange: &str) -> Vec<Message> {
        self.state
            .read()
            .await
            .published
            .iter()
            .filter(|m| m.exchange == exchange)
            .cloned()
            .collect()
    }

    /// Returns the number of recorded publishes.
    pub async fn published_count(&self) -> usize {
        self.state.read().await.published.len()
    }

    /// Returns the number of live bindings.
    pub async fn binding_count(&self) -> usize {
        let state = self.state.read().await;
        state
            .bindings
            .iter()
            .filter(|b| !b.sender.is_closed())
            .count()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if state.failing_exchanges.contains(exchange) {
            return Err(BusError::PublishFailed {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: "exchange unavailable".to_string(),
            });
        }

        let message = Message::builder()
            .exchange(exchange)
            .routing_key(routing_key)
            .payload_raw(payload)
            .header("content-type", "application/json")
            .try_build()
            .ok_or_else(|| BusError::PublishFailed {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                reason: "incomplete message".to_string(),
            })?;

        let copies = if state.duplicate_delivery { 2 } else { 1 };

        // A closed receiver means the subscriber went away; its queue goes with it.
        state.bindings.retain(|binding| {
            if binding.exchange != exchange || !pattern_matches(&binding.pattern, routing_key) {
                return !binding.sender.is_closed();
            }
            (0..copies).all(|_| binding.sender.send(message.clone()).is_ok())
        });

        if state.record {
            state.published.push(message);
        }

        metrics::counter!("bus_messages_published_total", "exchange" => exchange.to_string())
            .increment(1);
        tracing::debug!(exchange, routing_key, "message published");

        Ok(())
    }

    async fn subscribe(&self, exchange: &str, pattern: &str) -> Result<Subscription> {
        validate_pattern(pattern)?;

        let (sender, receiver) = mpsc::unbounded_channel();
        self.state.write().await.bindings.push(Binding {
            exchange: exchange.to_string(),
            pattern: pattern.to_string(),
            sender,
        });

        tracing::debug!(exchange, pattern, "subscription bound");
        Ok(Subscription::new(exchange, pattern, receiver))
    }
}
