//! Image side of the product lifecycle.

use std::sync::Arc;

use domain::events::{self, exchange};
use domain::{DeleteImage, EventType, ImageIntent, ImageResult, ImageResultKind, StoreImage, StorePurpose};
use event_bus::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{ImageStore, Result};

/// Answers image intents with image results.
///
/// Listens on three bindings:
/// - creation intents (`product.creating` on `products_images_creating`)
/// - deletion intents (`product.deleted` on `products_images_deleting`)
/// - replacement uploads (`image.uploaded` on `products_images`)
///
/// Every outcome, success or failure, is published back on
/// `products_images` with the intent's correlation id.
pub struct ImageService<S: ?Sized, B: ?Sized> {
    store: Arc<S>,
    bus: Arc<B>,
}

impl<S, B> ImageService<S, B>
where
    S: ImageStore + ?Sized + 'static,
    B: EventBus + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, bus: Arc<B>) -> Self {
        Self { store, bus }
    }

    /// Binds the intent subscriptions and spawns a consume loop for each.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let bindings = [
            (exchange::IMAGES_CREATING, EventType::ProductCreating),
            (exchange::IMAGES_DELETING, EventType::ProductDeleted),
            (exchange::PRODUCT_IMAGES, EventType::ImageUploaded),
        ];

        let mut handles = Vec::with_capacity(bindings.len());
        for (exchange, event_type) in bindings {
            let subscription = self.bus.subscribe(exchange, event_type.as_str()).await?;
            let service = Arc::clone(&self);
            handles.push(event_bus::consume(
                subscription,
                shutdown.clone(),
                move |intent: ImageIntent| {
                    let service = Arc::clone(&service);
                    async move { service.handle(intent).await }
                },
            ));
        }

        tracing::info!("image service started");
        Ok(handles)
    }

    /// Executes one image intent and publishes its result.
    pub async fn handle(&self, intent: ImageIntent) -> Result<()> {
        match intent {
            ImageIntent::Store(store) => self.handle_store(store).await,
            ImageIntent::Delete(delete) => self.handle_delete(delete).await,
        }
    }

    #[tracing::instrument(
        skip(self, intent),
        fields(product_id = %intent.product_id, correlation_id = %intent.correlation_id, purpose = ?intent.purpose)
    )]
    async fn handle_store(&self, intent: StoreImage) -> Result<()> {
        let kind = match intent.purpose {
            StorePurpose::Create => ImageResultKind::Created,
            StorePurpose::Replace => ImageResultKind::Processed,
        };

        let url = match self
            .store
            .store(&intent.image.data, &intent.image.filename, intent.product_id)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                metrics::counter!("image_operations_total", "op" => "store", "outcome" => "failed")
                    .increment(1);
                tracing::warn!(error = %e, "failed to store image");
                let result =
                    ImageResult::failed(intent.correlation_id, intent.product_id, kind, e.to_string());
                events::publish(self.bus.as_ref(), &result).await?;
                return Ok(());
            }
        };

        let result = ImageResult::stored(intent.correlation_id, intent.product_id, kind, &url);
        if let Err(e) = events::publish(self.bus.as_ref(), &result).await {
            match intent.purpose {
                // Nobody will learn about the new object; remove it.
                StorePurpose::Create => {
                    if let Err(delete_err) = self.store.delete(&url).await {
                        tracing::error!(%url, error = %delete_err, "failed to delete unreported image");
                    }
                }
                // The key is the product's live image; it stays.
                StorePurpose::Replace => {
                    tracing::error!(%url, error = %e, "failed to report replaced image");
                }
            }
            return Err(e.into());
        }

        metrics::counter!("image_operations_total", "op" => "store", "outcome" => "ok")
            .increment(1);
        tracing::info!(%url, "image stored");
        Ok(())
    }

    #[tracing::instrument(
        skip(self, intent),
        fields(product_id = %intent.product_id, correlation_id = %intent.correlation_id)
    )]
    async fn handle_delete(&self, intent: DeleteImage) -> Result<()> {
        let url = intent
            .image_url
            .unwrap_or_else(|| self.store.url_for(intent.product_id));

        let outcome = self.store.delete(&url).await;
        let label = if outcome.is_ok() { "ok" } else { "failed" };
        metrics::counter!("image_operations_total", "op" => "delete", "outcome" => label)
            .increment(1);

        let result = match outcome {
            Ok(()) => {
                tracing::info!(%url, "image deleted");
                ImageResult::deleted(intent.correlation_id, intent.product_id)
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "failed to delete image");
                ImageResult::failed(
                    intent.correlation_id,
                    intent.product_id,
                    ImageResultKind::Deleted,
                    e.to_string(),
                )
            }
        };

        events::publish(self.bus.as_ref(), &result).await?;
        Ok(())
    }
}
