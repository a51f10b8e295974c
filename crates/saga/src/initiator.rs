//! Saga initiator: publish an intent, then wait for its completion.

use std::sync::Arc;
use std::time::Duration;

use common::{CorrelationId, ProductId};
use domain::events::{self, exchange};
use domain::{
    CreateProduct, DeleteProduct, EventType, ImageIntent, ImagePayload, LifecycleEvent,
    NewProduct, ProductChanges, ProductIntent, SagaCompletion, StoreImage, StorePurpose,
    UpdateProduct,
};
use event_bus::EventBus;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::InitiatorError;
use crate::registry::CompletionRegistry;

/// How long the initiator waits for each kind of saga.
#[derive(Debug, Clone)]
pub struct InitiatorConfig {
    pub create_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(10),
            delete_timeout: Duration::from_secs(5),
        }
    }
}

/// What the caller learns about a saga it started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    /// The saga finished; carries the product id.
    Completed(ProductId),
    /// The saga finished unsuccessfully and was compensated.
    Failed(String),
    /// No completion within the timeout. The saga may still finish.
    TimedOut,
    /// The caller stopped waiting. The saga may still finish.
    Cancelled,
}

/// Input for a product creation.
#[derive(Debug, Clone)]
pub struct CreateProductRequest {
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: Option<ImagePayload>,
}

/// Publishes lifecycle intents and awaits their terminal events.
///
/// Each request gets a fresh correlation id. The waiter is registered
/// before the intent is published, so a completion can never arrive
/// unobserved. The in-flight saga is never retracted: a timeout or
/// cancellation only ends the wait.
pub struct SagaInitiator<B: ?Sized> {
    bus: Arc<B>,
    completions: CompletionRegistry<SagaCompletion>,
    config: InitiatorConfig,
}

impl<B> SagaInitiator<B>
where
    B: EventBus + ?Sized + 'static,
{
    pub fn new(bus: Arc<B>, config: InitiatorConfig) -> Self {
        Self {
            bus,
            completions: CompletionRegistry::new(),
            config,
        }
    }

    /// Binds the completion subscriptions and spawns their consume loops.
    /// Must run before any request is made.
    pub async fn run(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, InitiatorError> {
        let bindings = [
            (
                exchange::IMAGES_CREATING_COMPLETED,
                EventType::ProductCreatingCompleted,
            ),
            (
                exchange::IMAGES_DELETING_COMPLETED,
                EventType::ProductDeletedCompleted,
            ),
        ];

        let mut handles = Vec::with_capacity(bindings.len());
        for (exchange, event_type) in bindings {
            let subscription = self.bus.subscribe(exchange, event_type.as_str()).await?;
            let initiator = Arc::clone(&self);
            handles.push(event_bus::consume(
                subscription,
                shutdown.clone(),
                move |completion: SagaCompletion| {
                    let initiator = Arc::clone(&initiator);
                    async move {
                        initiator.handle_completion(completion);
                        Ok::<(), InitiatorError>(())
                    }
                },
            ));
        }

        tracing::info!("saga initiator started");
        Ok(handles)
    }

    /// Hands a completion to its waiter, if the waiter is still there.
    pub fn handle_completion(&self, completion: SagaCompletion) {
        let correlation_id = completion.correlation_id;
        if !self.completions.resolve(correlation_id, completion) {
            tracing::debug!(%correlation_id, "completion with no waiter");
        }
    }

    /// Starts a create saga and waits up to the create timeout.
    #[tracing::instrument(skip(self, request, cancel), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
        cancel: CancellationToken,
    ) -> Result<SagaOutcome, InitiatorError> {
        NewProduct::new(&request.name, &request.description, request.price).validate()?;
        if request.image.as_ref().is_some_and(|i| i.data.is_empty()) {
            return Err(InitiatorError::Validation("image is empty".to_string()));
        }

        let intent = ProductIntent::Create(CreateProduct {
            correlation_id: CorrelationId::new(),
            name: request.name,
            description: request.description,
            price: request.price,
            image: request.image,
        });
        self.start_and_wait(intent, self.config.create_timeout, cancel)
            .await
    }

    /// Starts a delete saga and waits up to the delete timeout.
    ///
    /// `image_url` is the product's current image; without one the saga
    /// never involves the image service.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_product(
        &self,
        product_id: ProductId,
        image_url: Option<String>,
        cancel: CancellationToken,
    ) -> Result<SagaOutcome, InitiatorError> {
        ensure_assigned(product_id)?;

        let intent = ProductIntent::Delete(DeleteProduct {
            correlation_id: CorrelationId::new(),
            product_id,
            image_url,
        });
        self.start_and_wait(intent, self.config.delete_timeout, cancel)
            .await
    }

    /// Publishes a metadata update. Nothing is awaited.
    #[tracing::instrument(skip(self, changes))]
    pub async fn update_product(
        &self,
        product_id: ProductId,
        changes: ProductChanges,
    ) -> Result<CorrelationId, InitiatorError> {
        ensure_assigned(product_id)?;
        if let Some(price) = changes.price {
            domain::validate_price(price)?;
        }

        let intent = ProductIntent::Update(UpdateProduct {
            correlation_id: CorrelationId::new(),
            product_id,
            changes,
        });
        events::publish(self.bus.as_ref(), &intent).await?;
        Ok(intent.correlation_id())
    }

    /// Publishes a replacement image upload. Nothing is awaited; the URL is
    /// updated when the image service reports `image.processed`.
    #[tracing::instrument(skip(self, image), fields(bytes = image.data.len()))]
    pub async fn replace_image(
        &self,
        product_id: ProductId,
        image: ImagePayload,
    ) -> Result<CorrelationId, InitiatorError> {
        ensure_assigned(product_id)?;
        if image.data.is_empty() {
            return Err(InitiatorError::Validation("image is empty".to_string()));
        }

        let intent = ImageIntent::Store(StoreImage {
            correlation_id: CorrelationId::new(),
            product_id,
            image,
            purpose: StorePurpose::Replace,
        });
        events::publish(self.bus.as_ref(), &intent).await?;
        Ok(intent.correlation_id())
    }

    /// Number of requests currently waiting for a completion.
    pub fn in_flight(&self) -> usize {
        self.completions.len()
    }

    async fn start_and_wait(
        &self,
        intent: ProductIntent,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<SagaOutcome, InitiatorError> {
        let correlation_id = intent.correlation_id();
        let mut pending = self
            .completions
            .register(correlation_id)
            .ok_or(InitiatorError::DuplicateCorrelation(correlation_id))?;

        events::publish(self.bus.as_ref(), &intent).await?;
        tracing::info!(%correlation_id, event_type = %intent.event_type(), "intent published");

        let outcome = tokio::select! {
            completion = pending.recv() => match completion {
                Some(completion) => match completion.error {
                    None => SagaOutcome::Completed(completion.product_id),
                    Some(error) => SagaOutcome::Failed(error),
                },
                None => SagaOutcome::Failed("completion channel closed".to_string()),
            },
            () = tokio::time::sleep(timeout) => {
                metrics::counter!("initiator_timeouts_total").increment(1);
                tracing::warn!(%correlation_id, ?timeout, "saga outcome unknown");
                SagaOutcome::TimedOut
            }
            () = cancel.cancelled() => {
                tracing::info!(%correlation_id, "wait cancelled");
                SagaOutcome::Cancelled
            }
        };

        Ok(outcome)
    }
}

fn ensure_assigned(product_id: ProductId) -> Result<(), InitiatorError> {
    if product_id.is_assigned() {
        Ok(())
    } else {
        Err(InitiatorError::Validation(format!(
            "invalid product id {product_id}"
        )))
    }
}
