//! Domain layer for the storefront product lifecycle.
//!
//! This crate provides:
//! - the `Product` record and its guarded `ProductStatus` state machine
//! - the lifecycle events exchanged between initiator, coordinator and
//!   image service, as typed variants plus their flat JSON wire form
//! - the `ProductStore` trait with in-memory and PostgreSQL implementations

pub mod error;
pub mod events;
pub mod product;
pub mod store;

pub use common::{CorrelationId, ProductId};
pub use error::{EventError, ProductError, Result};
pub use events::{
    CompletionKind, CreateProduct, DeleteImage, DeleteProduct, EventType, ImageIntent,
    ImageOutcome, ImagePayload, ImageResult, ImageResultKind, LifecycleEvent, LifecycleMessage,
    ProductIntent, SagaCompletion, StoreImage, StorePurpose, UpdateProduct, exchange, publish,
};
pub use product::{NewProduct, Product, ProductChanges, ProductStatus, slugify, validate_price};
pub use store::{InMemoryProductStore, PostgresProductStore, ProductStore};
