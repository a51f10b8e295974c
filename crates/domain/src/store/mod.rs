//! Product persistence with guarded status transitions.

mod memory;
mod postgres;

pub use memory::InMemoryProductStore;
pub use postgres::PostgresProductStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;

use crate::{NewProduct, Product, ProductStatus, Result};

/// Owner of the product record and its lifecycle status.
///
/// Every status change is a single statement guarded on the expected
/// pre-state. When the guard matches zero rows the operation fails and the
/// row is left untouched, so two sagas racing on one product can never both
/// win the same transition.
#[async_trait]
pub trait ProductStore: Send + Sync {
    /// Inserts a `pending` row. Fails with `AlreadyExists` only if the insert
    /// itself hits a uniqueness constraint.
    async fn begin_create(&self, product: &NewProduct) -> Result<Product>;

    /// Inserts an `active` row directly, for creates without an image.
    async fn create_active(&self, product: &NewProduct) -> Result<Product>;

    /// `pending -> active`.
    async fn complete_create(&self, id: ProductId) -> Result<()>;

    /// Removes a `pending` row. `NotFound` if no pending row matched.
    async fn rollback_create(&self, id: ProductId) -> Result<()>;

    /// `active -> deleting`.
    async fn begin_delete(&self, id: ProductId) -> Result<()>;

    /// Removes a `deleting` row.
    async fn complete_delete(&self, id: ProductId) -> Result<()>;

    /// `deleting -> active`.
    async fn rollback_delete(&self, id: ProductId) -> Result<()>;

    /// Writes name, description, slug and price. Status and image URL are
    /// not touched.
    async fn update(&self, product: &Product) -> Result<Product>;

    /// Sets the image URL only.
    async fn update_image_url(&self, id: ProductId, url: &str) -> Result<()>;

    async fn get(&self, id: ProductId) -> Result<Option<Product>>;

    /// Lists products ordered by id, optionally filtered by status.
    async fn list(&self, status: Option<ProductStatus>) -> Result<Vec<Product>>;

    /// Rows in any of `statuses` last written before `older_than`.
    async fn find_stale(
        &self,
        statuses: &[ProductStatus],
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Product>>;
}
