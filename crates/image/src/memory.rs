use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use tokio::sync::RwLock;

use crate::store::{ImageStore, key_from_url, object_key, validate_store};
use crate::{ImageError, Result};

#[derive(Default)]
struct ImageState {
    objects: HashMap<String, Vec<u8>>,
    fail_stores: bool,
    fail_deletes: bool,
    delay: Option<Duration>,
}

/// In-memory image store.
///
/// Tests can make stores or deletes fail and slow every operation down to
/// provoke saga timeouts.
#[derive(Clone)]
pub struct InMemoryImageStore {
    state: Arc<RwLock<ImageState>>,
    base_url: String,
}

impl InMemoryImageStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub async fn set_fail_stores(&self, fail: bool) {
        self.state.write().await.fail_stores = fail;
    }

    pub async fn set_fail_deletes(&self, fail: bool) {
        self.state.write().await.fail_deletes = fail;
    }

    /// Delays every store and delete by `delay`.
    pub async fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().await.delay = delay;
    }

    /// Returns the stored bytes of the image of `product_id`.
    pub async fn get(&self, product_id: ProductId) -> Option<Vec<u8>> {
        self.state
            .read()
            .await
            .objects
            .get(&object_key(product_id))
            .cloned()
    }

    pub async fn contains(&self, product_id: ProductId) -> bool {
        self.get(product_id).await.is_some()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn wait(&self) {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryImageStore {
    fn default() -> Self {
        Self::new("memory://images")
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn store(&self, data: &[u8], _filename: &str, product_id: ProductId) -> Result<String> {
        let key = validate_store(data, product_id)?;
        self.wait().await;

        let mut state = self.state.write().await;
        if state.fail_stores {
            return Err(ImageError::Unavailable("store rejected".to_string()));
        }
        state.objects.insert(key, data.to_vec());
        Ok(self.url_for(product_id))
    }

    async fn delete(&self, url: &str) -> Result<()> {
        let key = key_from_url(url)?;
        self.wait().await;

        let mut state = self.state.write().await;
        if state.fail_deletes {
            return Err(ImageError::Unavailable("delete rejected".to_string()));
        }
        state.objects.remove(key);
        Ok(())
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_delete() {
        let store = InMemoryImageStore::new("http://img/");
        let url = store.store(b"abc", "a.jpg", ProductId::new(5)).await.unwrap();
        assert_eq!(url, "http://img/5.jpg");
        assert_eq!(store.get(ProductId::new(5)).await, Some(b"abc".to_vec()));

        store.delete(&url).await.unwrap();
        assert!(store.is_empty().await);
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn test_failure_hooks() {
        let store = InMemoryImageStore::default();
        store.set_fail_stores(true).await;
        assert!(matches!(
            store.store(b"abc", "a.jpg", ProductId::new(1)).await,
            Err(ImageError::Unavailable(_))
        ));

        store.set_fail_stores(false).await;
        let url = store.store(b"abc", "a.jpg", ProductId::new(1)).await.unwrap();
        store.set_fail_deletes(true).await;
        assert!(store.delete(&url).await.is_err());
        assert!(store.contains(ProductId::new(1)).await);
    }
}
