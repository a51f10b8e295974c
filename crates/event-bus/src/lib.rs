//! Topic-routed publish/subscribe for the storefront services.
//!
//! The [`EventBus`] trait is the contract the saga participants rely on:
//! fire-and-forget publishing to a named exchange and exclusive
//! subscriptions bound with AMQP-style topic patterns. Delivery is
//! at-least-once and unordered across routing keys.
//!
//! [`InMemoryEventBus`] implements the contract in-process and carries
//! hooks for exercising failure modes in tests.

pub mod bus;
pub mod consumer;
pub mod error;
pub mod memory;
pub mod message;
pub mod topic;

pub use bus::{EventBus, EventBusExt, Subscription};
pub use consumer::consume;
pub use error::{BusError, Result};
pub use memory::InMemoryEventBus;
pub use message::{Message, MessageBuilder, MessageId};
pub use topic::{pattern_matches, validate_pattern};
