use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ProductId;
use tokio::sync::RwLock;

use super::ProductStore;
use crate::{NewProduct, Product, ProductError, ProductStatus, Result, slugify};

#[derive(Default)]
struct StoreState {
    products: BTreeMap<ProductId, Product>,
    next_id: i32,
    fail_rollbacks: bool,
    fail_completes: bool,
}

impl StoreState {
    fn insert(&mut self, new: &NewProduct, status: ProductStatus) -> Result<Product> {
        new.validate()?;

        let slug = slugify(&new.name);
        if self.products.values().any(|p| p.slug == slug) {
            return Err(ProductError::AlreadyExists(slug));
        }

        self.next_id += 1;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(self.next_id),
            name: new.name.clone(),
            description: new.description.clone(),
            slug,
            price: new.price,
            image_url: None,
            status,
            created_at: now,
            updated_at: now,
        };
        self.products.insert(product.id, product.clone());
        Ok(product)
    }

    /// Applies `to` to the row with `id` if it is in `expected` status.
    fn transition(
        &mut self,
        id: ProductId,
        expected: ProductStatus,
        to: ProductStatus,
    ) -> Result<()> {
        match self.products.get_mut(&id) {
            Some(product) if product.status == expected => {
                product.status = to;
                product.updated_at = Utc::now();
                Ok(())
            }
            _ => Err(ProductError::InvalidState { id, expected }),
        }
    }

    /// Removes the row with `id` if it is in `expected` status.
    fn remove(&mut self, id: ProductId, expected: ProductStatus) -> bool {
        if self
            .products
            .get(&id)
            .is_some_and(|product| product.status == expected)
        {
            self.products.remove(&id);
            true
        } else {
            false
        }
    }
}

/// In-memory product store.
///
/// Applies the same guards as the PostgreSQL store under a single lock.
/// Tests can make compensations or forward completions fail, and backdate
/// rows to exercise the reconciler.
#[derive(Clone, Default)]
pub struct InMemoryProductStore {
    state: Arc<RwLock<StoreState>>,
}

impl InMemoryProductStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `rollback_create` and `rollback_delete` fail with a storage error.
    pub async fn set_fail_rollbacks(&self, fail: bool) {
        self.state.write().await.fail_rollbacks = fail;
    }

    /// Makes `complete_create` and `complete_delete` fail with a storage error.
    pub async fn set_fail_completes(&self, fail: bool) {
        self.state.write().await.fail_completes = fail;
    }

    /// Overwrites a row's `updated_at`. Returns false if there is no such row.
    pub async fn set_updated_at(&self, id: ProductId, updated_at: DateTime<Utc>) -> bool {
        match self.state.write().await.products.get_mut(&id) {
            Some(product) => {
                product.updated_at = updated_at;
                true
            }
            None => false,
        }
    }

    /// Returns the number of rows in any status.
    pub async fn len(&self) -> usize {
        self.state.read().await.products.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    async fn begin_create(&self, product: &NewProduct) -> Result<Product> {
        self.state
            .write()
            .await
            .insert(product, ProductStatus::Pending)
    }

    async fn create_active(&self, product: &NewProduct) -> Result<Product> {
        self.state
            .write()
            .await
            .insert(product, ProductStatus::Active)
    }

    async fn complete_create(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_completes {
            return Err(ProductError::Storage("complete_create unavailable".to_string()));
        }
        state.transition(id, ProductStatus::Pending, ProductStatus::Active)
    }

    async fn rollback_create(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_rollbacks {
            return Err(ProductError::Storage("rollback_create unavailable".to_string()));
        }
        if state.remove(id, ProductStatus::Pending) {
            Ok(())
        } else {
            Err(ProductError::NotFound(id))
        }
    }

    async fn begin_delete(&self, id: ProductId) -> Result<()> {
        self.state
            .write()
            .await
            .transition(id, ProductStatus::Active, ProductStatus::Deleting)
    }

    async fn complete_delete(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_completes {
            return Err(ProductError::Storage("complete_delete unavailable".to_string()));
        }
        if state.remove(id, ProductStatus::Deleting) {
            Ok(())
        } else {
            Err(ProductError::InvalidState {
                id,
                expected: ProductStatus::Deleting,
            })
        }
    }

    async fn rollback_delete(&self, id: ProductId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_rollbacks {
            return Err(ProductError::Storage("rollback_delete unavailable".to_string()));
        }
        state.transition(id, ProductStatus::Deleting, ProductStatus::Active)
    }

    async fn update(&self, product: &Product) -> Result<Product> {
        crate::product::validate_price(product.price)?;

        let mut state = self.state.write().await;
        if state
            .products
            .values()
            .any(|p| p.id != product.id && p.slug == product.slug)
        {
            return Err(ProductError::AlreadyExists(product.slug.clone()));
        }

        let row = state
            .products
            .get_mut(&product.id)
            .ok_or(ProductError::NotFound(product.id))?;
        row.name = product.name.clone();
        row.description = product.description.clone();
        row.slug = product.slug.clone();
        row.price = product.price;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn update_image_url(&self, id: ProductId, url: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let row = state
            .products
            .get_mut(&id)
            .ok_or(ProductError::NotFound(id))?;
        row.image_url = Some(url.to_string());
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list(&self, status: Option<ProductStatus>) -> Result<Vec<Product>> {
        Ok(self
            .state
            .read()
            .await
            .products
            .values()
            .filter(|p| status.is_none_or(|s| p.status == s))
            .cloned()
            .collect())
    }

    async fn find_stale(
        &self,
        statuses: &[ProductStatus],
        older_than: DateTime<Utc>,
    ) -> Result<Vec<Product>> {
        Ok(self
            .state
            .read()
            .await
            .products
            .values()
            .filter(|p| statuses.contains(&p.status) && p.updated_at < older_than)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn lamp() -> NewProduct {
        NewProduct::new("Desk Lamp", "Warm light", Decimal::new(1999, 2))
    }

    async fn status_of(store: &InMemoryProductStore, id: ProductId) -> Option<ProductStatus> {
        store.get(id).await.unwrap().map(|p| p.status)
    }

    #[tokio::test]
    async fn test_create_path_pending_to_active() {
        let store = InMemoryProductStore::new();
        let product = store.begin_create(&lamp()).await.unwrap();
        assert!(product.id.is_assigned());
        assert_eq!(product.status, ProductStatus::Pending);
        assert!(product.slug.starts_with("desk-lamp-"));

        store.complete_create(product.id).await.unwrap();
        assert_eq!(status_of(&store, product.id).await, Some(ProductStatus::Active));

        // The pair is mutually exclusive: an active row cannot be rolled back.
        assert!(matches!(
            store.rollback_create(product.id).await,
            Err(ProductError::NotFound(_))
        ));
        assert_eq!(status_of(&store, product.id).await, Some(ProductStatus::Active));
    }

    #[tokio::test]
    async fn test_rollback_create_removes_pending_row() {
        let store = InMemoryProductStore::new();
        let product = store.begin_create(&lamp()).await.unwrap();

        store.rollback_create(product.id).await.unwrap();
        assert!(store.get(product.id).await.unwrap().is_none());
        assert!(matches!(
            store.complete_create(product.id).await,
            Err(ProductError::InvalidState { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_path_and_rollback() {
        let store = InMemoryProductStore::new();
        let product = store.create_active(&lamp()).await.unwrap();

        store.begin_delete(product.id).await.unwrap();
        assert_eq!(status_of(&store, product.id).await, Some(ProductStatus::Deleting));

        store.rollback_delete(product.id).await.unwrap();
        assert_eq!(status_of(&store, product.id).await, Some(ProductStatus::Active));

        store.begin_delete(product.id).await.unwrap();
        store.complete_delete(product.id).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_guards_reject_wrong_state() {
        let store = InMemoryProductStore::new();
        let pending = store.begin_create(&lamp()).await.unwrap();

        for result in [
            store.begin_delete(pending.id).await,
            store.complete_delete(pending.id).await,
            store.rollback_delete(pending.id).await,
        ] {
            assert!(matches!(result, Err(ProductError::InvalidState { .. })));
        }
        assert_eq!(status_of(&store, pending.id).await, Some(ProductStatus::Pending));
    }

    #[tokio::test]
    async fn test_concurrent_begin_delete_has_one_winner() {
        let store = InMemoryProductStore::new();
        let product = store.create_active(&lamp()).await.unwrap();

        let (a, b) = tokio::join!(store.begin_delete(product.id), store.begin_delete(product.id));
        let wins = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_negative_price_never_written() {
        let store = InMemoryProductStore::new();
        let result = store
            .begin_create(&NewProduct::new("Lamp", "", Decimal::from(-3)))
            .await;
        assert!(matches!(result, Err(ProductError::InvalidPrice(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_leaves_status_and_image_alone() {
        let store = InMemoryProductStore::new();
        let product = store.create_active(&lamp()).await.unwrap();
        store
            .update_image_url(product.id, "http://localhost/images/1.jpg")
            .await
            .unwrap();

        let mut changed = store.get(product.id).await.unwrap().unwrap();
        changed.name = "Floor Lamp".to_string();
        changed.image_url = None;
        changed.status = ProductStatus::Deleting;
        let updated = store.update(&changed).await.unwrap();

        assert_eq!(updated.name, "Floor Lamp");
        assert_eq!(updated.status, ProductStatus::Active);
        assert_eq!(
            updated.image_url.as_deref(),
            Some("http://localhost/images/1.jpg")
        );
    }

    #[tokio::test]
    async fn test_list_and_find_stale() {
        let store = InMemoryProductStore::new();
        let active = store.create_active(&lamp()).await.unwrap();
        let pending = store
            .begin_create(&NewProduct::new("Chair", "", Decimal::ONE))
            .await
            .unwrap();

        let listed = store.list(Some(ProductStatus::Active)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active.id);
        assert_eq!(store.list(None).await.unwrap().len(), 2);

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        assert!(
            store
                .find_stale(&[ProductStatus::Pending], cutoff)
                .await
                .unwrap()
                .is_empty()
        );

        assert!(
            store
                .set_updated_at(pending.id, cutoff - chrono::Duration::seconds(1))
                .await
        );
        let stale = store
            .find_stale(&[ProductStatus::Pending, ProductStatus::Deleting], cutoff)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, pending.id);
    }

    #[tokio::test]
    async fn test_failure_hooks() {
        let store = InMemoryProductStore::new();
        let product = store.begin_create(&lamp()).await.unwrap();

        store.set_fail_rollbacks(true).await;
        assert!(matches!(
            store.rollback_create(product.id).await,
            Err(ProductError::Storage(_))
        ));
        assert_eq!(status_of(&store, product.id).await, Some(ProductStatus::Pending));

        store.set_fail_completes(true).await;
        assert!(store.complete_create(product.id).await.is_err());
    }
}
