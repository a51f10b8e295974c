use std::path::{Path, PathBuf};

use async_trait::async_trait;
use common::ProductId;
use uuid::Uuid;

use crate::{ImageError, Result};

/// Binary asset persistence keyed by product id.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores `data` for `product_id` and returns its URL. Overwrites any
    /// previous image of the product.
    async fn store(&self, data: &[u8], filename: &str, product_id: ProductId) -> Result<String>;

    /// Deletes the object addressed by `url`. Deleting a missing object
    /// succeeds.
    async fn delete(&self, url: &str) -> Result<()>;

    /// The URL prefix every stored object is served under.
    fn base_url(&self) -> &str;

    /// Canonical URL of the image of `product_id`.
    fn url_for(&self, product_id: ProductId) -> String {
        format!(
            "{}/{}",
            self.base_url().trim_end_matches('/'),
            object_key(product_id)
        )
    }
}

/// Storage key of the image of `product_id`.
pub fn object_key(product_id: ProductId) -> String {
    format!("{product_id}.jpg")
}

/// Extracts the storage key from an image URL.
///
/// The key is the last path segment. URLs with `..` segments, backslashes or
/// an empty final segment are rejected.
pub fn key_from_url(url: &str) -> Result<&str> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    if path.split('/').any(|segment| segment == "..") || path.contains('\\') {
        return Err(ImageError::InvalidKey(url.to_string()));
    }

    match path.rsplit('/').next() {
        Some(key) if !key.is_empty() && key != "." && !key.contains('\0') => Ok(key),
        _ => Err(ImageError::InvalidKey(url.to_string())),
    }
}

pub(crate) fn validate_store(data: &[u8], product_id: ProductId) -> Result<String> {
    if data.is_empty() {
        return Err(ImageError::EmptyPayload);
    }
    if !product_id.is_assigned() {
        return Err(ImageError::InvalidKey(object_key(product_id)));
    }
    Ok(object_key(product_id))
}

/// Stores images as files in a local directory.
#[derive(Debug, Clone)]
pub struct FileImageStore {
    base_path: PathBuf,
    base_url: String,
}

impl FileImageStore {
    /// Creates the store, creating `base_path` if needed.
    pub async fn new(base_path: impl Into<PathBuf>, base_url: impl Into<String>) -> Result<Self> {
        let base_path = base_path.into();
        tokio::fs::create_dir_all(&base_path).await?;
        Ok(Self {
            base_path,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Directory images are written to.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

#[async_trait]
impl ImageStore for FileImageStore {
    #[tracing::instrument(skip(self, data), fields(bytes = data.len()))]
    async fn store(&self, data: &[u8], filename: &str, product_id: ProductId) -> Result<String> {
        let key = validate_store(data, product_id)?;

        // Write then rename so readers never see a half-written image.
        let path = self.base_path.join(&key);
        // Unique per write so concurrent stores for one product never share it.
        let tmp = self
            .base_path
            .join(format!(".{key}.{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, data).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), "image stored");
        Ok(self.url_for(product_id))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, url: &str) -> Result<()> {
        let key = key_from_url(url)?;
        match tokio::fs::remove_file(self.base_path.join(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(key, "image already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_in(dir: &tempfile::TempDir) -> FileImageStore {
        FileImageStore::new(dir.path().join("images"), "http://localhost:3000/images/")
            .await
            .unwrap()
    }

    #[test]
    fn test_key_from_url() {
        assert_eq!(
            key_from_url("http://localhost:3000/images/7.jpg").unwrap(),
            "7.jpg"
        );
        assert_eq!(key_from_url("7.jpg?v=2").unwrap(), "7.jpg");
        assert!(key_from_url("http://localhost:3000/images/").is_err());
        assert!(key_from_url("http://localhost:3000/images/../secrets").is_err());
        assert!(key_from_url("http://localhost:3000/images/..").is_err());
        assert!(key_from_url("..\\..\\boot.ini").is_err());
    }

    #[tokio::test]
    async fn test_store_writes_keyed_file_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let url = store.store(b"first", "a.png", ProductId::new(7)).await.unwrap();
        assert_eq!(url, "http://localhost:3000/images/7.jpg");
        assert_eq!(url, store.url_for(ProductId::new(7)));

        store.store(b"second", "b.png", ProductId::new(7)).await.unwrap();
        let bytes = tokio::fs::read(store.base_path().join("7.jpg")).await.unwrap();
        assert_eq!(bytes, b"second");
    }

    #[tokio::test]
    async fn test_concurrent_stores_for_one_product_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let writes = (0..16u8).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.store(&[i; 64], "a.jpg", ProductId::new(5)).await })
        });
        for write in writes.collect::<Vec<_>>() {
            write.await.unwrap().unwrap();
        }

        let mut entries = tokio::fs::read_dir(store.base_path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["5.jpg".to_string()]);
    }

    #[tokio::test]
    async fn test_store_rejects_empty_and_unassigned() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        assert!(matches!(
            store.store(b"", "a.jpg", ProductId::new(1)).await,
            Err(ImageError::EmptyPayload)
        ));
        assert!(matches!(
            store.store(b"x", "a.jpg", ProductId::UNASSIGNED).await,
            Err(ImageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let url = store.store(b"img", "a.jpg", ProductId::new(3)).await.unwrap();

        store.delete(&url).await.unwrap();
        assert!(!store.base_path().join("3.jpg").exists());
        store.delete(&url).await.unwrap();
        store.delete(&store.url_for(ProductId::new(99))).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        let outside = dir.path().join("keep.txt");
        tokio::fs::write(&outside, b"keep").await.unwrap();

        let result = store.delete("http://localhost:3000/images/../keep.txt").await;
        assert!(matches!(result, Err(ImageError::InvalidKey(_))));
        assert!(outside.exists());
    }
}
