//! Lifecycle events exchanged over the bus.
//!
//! Every event travels as a flat [`LifecycleMessage`] and is decoded at the
//! consumer boundary into one of the typed families:
//!
//! - [`ProductIntent`]: what the admin side asks the coordinator to do
//! - [`ImageIntent`]: what the coordinator asks the image service to do
//! - [`ImageResult`]: what the image service reports back
//! - [`SagaCompletion`]: the terminal outcome the initiator waits for
//!
//! The typed families serialize through the wire form, so they can be handed
//! straight to `EventBusExt::publish_json` or decoded by `event_bus::consume`.

mod typed;
mod wire;

pub use typed::{
    CompletionKind, CreateProduct, DeleteImage, DeleteProduct, ImageIntent, ImageOutcome,
    ImagePayload, ImageResult, ImageResultKind, ProductIntent, SagaCompletion, StoreImage,
    StorePurpose, UpdateProduct,
};
pub use wire::{EventType, LifecycleMessage};

use common::CorrelationId;
use event_bus::{EventBus, EventBusExt};
use serde::Serialize;

/// Exchange names.
pub mod exchange {
    /// Product intents: `product.creating`, `product.updating`, `product.deleted`.
    pub const PRODUCTS: &str = "products";
    /// Image uploads and image results.
    pub const PRODUCT_IMAGES: &str = "products_images";
    /// Image store intents for product creation.
    pub const IMAGES_CREATING: &str = "products_images_creating";
    /// Create saga completions.
    pub const IMAGES_CREATING_COMPLETED: &str = "products_images_creating_completed";
    /// Image delete intents.
    pub const IMAGES_DELETING: &str = "products_images_deleting";
    /// Delete saga completions.
    pub const IMAGES_DELETING_COMPLETED: &str = "products_images_deleting_completed";
}

/// A typed event that knows where it is published.
pub trait LifecycleEvent: Serialize + Send + Sync {
    /// The wire discriminator, also used as the routing key.
    fn event_type(&self) -> EventType;

    /// The exchange the event is published to.
    fn exchange(&self) -> &'static str;

    /// The saga this event belongs to.
    fn correlation_id(&self) -> CorrelationId;
}

/// Publishes `event` to its exchange with its event type as routing key.
pub async fn publish<B, E>(bus: &B, event: &E) -> event_bus::Result<()>
where
    B: EventBus + ?Sized,
    E: LifecycleEvent,
{
    let routing_key = event.event_type().as_str();
    tracing::debug!(
        exchange = event.exchange(),
        routing_key,
        correlation_id = %event.correlation_id(),
        "publishing lifecycle event"
    );
    bus.publish_json(event.exchange(), routing_key, event).await
}
