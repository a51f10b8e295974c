//! Saga coordinator for the product lifecycle.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{CorrelationId, ProductId};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::events::{self, exchange};
use domain::{
    CompletionKind, CreateProduct, DeleteImage, DeleteProduct, EventType, ImageIntent,
    ImageOutcome, ImagePayload, ImageResult, ImageResultKind, LifecycleEvent, NewProduct,
    ProductError, ProductIntent, ProductStore, SagaCompletion, StoreImage, StorePurpose,
    UpdateProduct,
};
use event_bus::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::CompletionRegistry;
use crate::state::SagaState;
use crate::{Result, SagaError};

const STEP_ROLLBACK_CREATE: &str = "rollback_create";
const STEP_ROLLBACK_DELETE: &str = "rollback_delete";

/// Coordinator timing.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How long a saga waits for the image service before compensating.
    pub image_timeout: Duration,
    /// How long finished sagas are remembered to drop redelivered intents.
    pub dedupe_window: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            image_timeout: Duration::from_secs(30),
            dedupe_window: Duration::from_secs(600),
        }
    }
}

/// What the coordinator knows about one saga.
#[derive(Debug, Clone, PartialEq)]
pub struct SagaRecord {
    pub correlation_id: CorrelationId,
    pub kind: CompletionKind,
    /// Unassigned until a create saga has inserted its row.
    pub product_id: ProductId,
    pub state: SagaState,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Drives create and delete sagas.
///
/// Consumes product intents and image results. Each create or delete saga
/// moves the product row through guarded transitions, asks the image service
/// to act, waits for the correlated result at most `image_timeout`, and
/// compensates when any forward step fails. Every saga ends with exactly one
/// completion event. A saga whose compensation fails is recorded as
/// [`SagaState::Stuck`] and listed by [`stuck_sagas`](Self::stuck_sagas).
pub struct SagaCoordinator<P: ?Sized, B: ?Sized> {
    store: Arc<P>,
    bus: Arc<B>,
    image_results: CompletionRegistry<ImageResult>,
    sagas: DashMap<CorrelationId, SagaRecord>,
    config: CoordinatorConfig,
}

impl<P, B> SagaCoordinator<P, B>
where
    P: ProductStore + ?Sized + 'static,
    B: EventBus + ?Sized + 'static,
{
    /// Creates a new saga coordinator.
    pub fn new(store: Arc<P>, bus: Arc<B>, config: CoordinatorConfig) -> Self {
        Self {
            store,
            bus,
            image_results: CompletionRegistry::new(),
            sagas: DashMap::new(),
            config,
        }
    }

    /// Binds the intent and image-result subscriptions and spawns their
    /// consume loops.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        let intents = self.bus.subscribe(exchange::PRODUCTS, "product.*").await?;
        let coordinator = Arc::clone(&self);
        handles.push(event_bus::consume(
            intents,
            shutdown.clone(),
            move |intent: ProductIntent| {
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.handle_intent(intent).await }
            },
        ));

        for event_type in [
            EventType::ImageCreated,
            EventType::ImageProcessed,
            EventType::ImageDeleted,
        ] {
            let results = self
                .bus
                .subscribe(exchange::PRODUCT_IMAGES, event_type.as_str())
                .await?;
            let coordinator = Arc::clone(&self);
            handles.push(event_bus::consume(
                results,
                shutdown.clone(),
                move |result: ImageResult| {
                    let coordinator = Arc::clone(&coordinator);
                    async move { coordinator.handle_image_result(result).await }
                },
            ));
        }

        tracing::info!("saga coordinator started");
        Ok(handles)
    }

    /// Handles one product intent.
    pub async fn handle_intent(&self, intent: ProductIntent) -> Result<()> {
        match intent {
            ProductIntent::Create(create) => self.create(create).await,
            ProductIntent::Update(update) => self.update(update).await,
            ProductIntent::Delete(delete) => self.delete(delete).await,
        }
    }

    /// Routes an image result to the saga waiting for it.
    ///
    /// Replacement results (`image.processed`) belong to no saga and only
    /// update the URL. Results nobody waits for are late or duplicate
    /// deliveries; they are counted and dropped.
    pub async fn handle_image_result(&self, result: ImageResult) -> Result<()> {
        if result.kind == ImageResultKind::Processed {
            return self.apply_replacement(result).await;
        }

        let correlation_id = result.correlation_id;
        let product_id = result.product_id;
        if !self.image_results.resolve(correlation_id, result) {
            metrics::counter!("saga_late_results_total").increment(1);
            tracing::warn!(
                %correlation_id,
                %product_id,
                "image result with no waiting saga, late or duplicate"
            );
        }
        Ok(())
    }

    /// Returns the record of the saga with `correlation_id`.
    pub fn saga(&self, correlation_id: CorrelationId) -> Option<SagaRecord> {
        self.sagas.get(&correlation_id).map(|r| r.clone())
    }

    /// Returns every saga whose compensation failed.
    pub fn stuck_sagas(&self) -> Vec<SagaRecord> {
        self.sagas
            .iter()
            .filter(|r| r.state == SagaState::Stuck)
            .map(|r| r.clone())
            .collect()
    }

    /// Number of sagas currently waiting for the image service.
    pub fn pending_image_waits(&self) -> usize {
        self.image_results.len()
    }

    #[tracing::instrument(
        skip(self, intent),
        fields(correlation_id = %intent.correlation_id, with_image = intent.image.is_some())
    )]
    async fn create(&self, intent: CreateProduct) -> Result<()> {
        let correlation_id = intent.correlation_id;
        if !self.begin_saga(correlation_id, CompletionKind::Create, ProductId::UNASSIGNED) {
            return Ok(());
        }

        let started = Instant::now();
        let new = NewProduct::new(intent.name, intent.description, intent.price);
        let outcome = match intent.image {
            None => self
                .store
                .create_active(&new)
                .await
                .map(|product| product.id)
                .map_err(SagaError::from),
            Some(image) => self.create_with_image(correlation_id, &new, image).await,
        };

        self.finish(correlation_id, CompletionKind::Create, started, outcome)
            .await
    }

    async fn create_with_image(
        &self,
        correlation_id: CorrelationId,
        new: &NewProduct,
        image: ImagePayload,
    ) -> Result<ProductId> {
        // First step: a failure here has nothing to compensate.
        let product = self.store.begin_create(new).await?;
        let product_id = product.id;
        self.record_product(correlation_id, product_id);
        tracing::info!(%product_id, "product pending, storing image");

        let mut stored_url = None;
        let forward: Result<()> = async {
            let result = self
                .request_image(ImageIntent::Store(StoreImage {
                    correlation_id,
                    product_id,
                    image,
                    purpose: StorePurpose::Create,
                }))
                .await?;
            let url = match result.outcome {
                ImageOutcome::Stored { url } => url,
                ImageOutcome::Failed { error } => return Err(SagaError::ImageFailed(error)),
                ImageOutcome::Deleted => {
                    return Err(SagaError::ImageFailed(
                        "delete result answered a store request".to_string(),
                    ));
                }
            };
            stored_url = Some(url.clone());

            self.store.update_image_url(product_id, &url).await?;
            self.store.complete_create(product_id).await?;
            Ok(())
        }
        .await;

        match forward {
            Ok(()) => Ok(product_id),
            Err(cause) => {
                self.compensate(
                    correlation_id,
                    product_id,
                    STEP_ROLLBACK_CREATE,
                    &cause,
                    self.store.rollback_create(product_id),
                )
                .await?;
                if let Some(url) = stored_url {
                    self.discard_image(product_id, url).await;
                }
                Err(cause)
            }
        }
    }

    #[tracing::instrument(
        skip(self, intent),
        fields(correlation_id = %intent.correlation_id, product_id = %intent.product_id)
    )]
    async fn update(&self, intent: UpdateProduct) -> Result<()> {
        let mut product = self
            .store
            .get(intent.product_id)
            .await?
            .ok_or(ProductError::NotFound(intent.product_id))?;

        product.apply_changes(&intent.changes)?;
        self.store.update(&product).await?;

        tracing::info!("product updated");
        Ok(())
    }

    #[tracing::instrument(
        skip(self, intent),
        fields(
            correlation_id = %intent.correlation_id,
            product_id = %intent.product_id,
            with_image = intent.image_url.is_some()
        )
    )]
    async fn delete(&self, intent: DeleteProduct) -> Result<()> {
        let DeleteProduct {
            correlation_id,
            product_id,
            image_url,
        } = intent;
        if !self.begin_saga(correlation_id, CompletionKind::Delete, product_id) {
            return Ok(());
        }

        let started = Instant::now();
        let outcome = self
            .delete_product(correlation_id, product_id, image_url)
            .await;

        self.finish(correlation_id, CompletionKind::Delete, started, outcome)
            .await
    }

    async fn delete_product(
        &self,
        correlation_id: CorrelationId,
        product_id: ProductId,
        image_url: Option<String>,
    ) -> Result<ProductId> {
        // First step: a lost race or missing row has nothing to compensate.
        self.store.begin_delete(product_id).await?;

        let forward: Result<()> = async {
            if let Some(url) = image_url {
                let result = self
                    .request_image(ImageIntent::Delete(DeleteImage {
                        correlation_id,
                        product_id,
                        image_url: Some(url),
                    }))
                    .await?;
                if let ImageOutcome::Failed { error } = result.outcome {
                    return Err(SagaError::ImageFailed(error));
                }
            }
            self.store.complete_delete(product_id).await?;
            Ok(())
        }
        .await;

        match forward {
            Ok(()) => Ok(product_id),
            Err(cause) => {
                self.compensate(
                    correlation_id,
                    product_id,
                    STEP_ROLLBACK_DELETE,
                    &cause,
                    self.store.rollback_delete(product_id),
                )
                .await?;
                Err(cause)
            }
        }
    }

    /// Publishes `intent` and waits for the correlated image result.
    async fn request_image(&self, intent: ImageIntent) -> Result<ImageResult> {
        let correlation_id = intent.correlation_id();
        let mut pending = self
            .image_results
            .register(correlation_id)
            .ok_or(SagaError::DuplicateCorrelation(correlation_id))?;

        events::publish(self.bus.as_ref(), &intent).await?;

        match tokio::time::timeout(self.config.image_timeout, pending.recv()).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Err(SagaError::ImageFailed(
                "image result channel closed".to_string(),
            )),
            Err(_) => {
                tracing::warn!(%correlation_id, timeout = ?self.config.image_timeout, "image result timed out");
                Err(SagaError::ImageTimeout(self.config.image_timeout))
            }
        }
    }

    /// Runs a rollback step. A row that already moved on counts as
    /// compensated; any other failure makes the saga stuck.
    async fn compensate<F>(
        &self,
        correlation_id: CorrelationId,
        product_id: ProductId,
        step: &'static str,
        cause: &SagaError,
        rollback: F,
    ) -> Result<()>
    where
        F: Future<Output = domain::Result<()>>,
    {
        self.set_state(correlation_id, SagaState::Compensating, Some(cause.to_string()));
        tracing::warn!(%correlation_id, %product_id, step, error = %cause, "compensating");

        match rollback.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_state_conflict() => {
                tracing::info!(%correlation_id, %product_id, step, error = %e, "row already resolved");
                Ok(())
            }
            Err(e) => Err(SagaError::Stuck {
                product_id,
                step,
                reason: e.to_string(),
                cause: cause.to_string(),
            }),
        }
    }

    /// Best-effort removal of an image whose saga was rolled back.
    async fn discard_image(&self, product_id: ProductId, url: String) {
        let intent = ImageIntent::Delete(DeleteImage {
            correlation_id: CorrelationId::new(),
            product_id,
            image_url: Some(url),
        });
        if let Err(e) = events::publish(self.bus.as_ref(), &intent).await {
            tracing::error!(%product_id, error = %e, "failed to discard image of rolled back product");
        }
    }

    async fn apply_replacement(&self, result: ImageResult) -> Result<()> {
        let product_id = result.product_id;
        match result.outcome {
            ImageOutcome::Stored { url } => {
                self.store.update_image_url(product_id, &url).await?;
                tracing::info!(%product_id, %url, "image replaced");
            }
            ImageOutcome::Failed { error } => {
                tracing::warn!(%product_id, %error, "image replacement failed");
            }
            ImageOutcome::Deleted => {}
        }
        Ok(())
    }

    /// Records the outcome and publishes the completion event.
    async fn finish(
        &self,
        correlation_id: CorrelationId,
        kind: CompletionKind,
        started: Instant,
        outcome: Result<ProductId>,
    ) -> Result<()> {
        let label = kind.as_str();
        metrics::histogram!("saga_duration_seconds", "kind" => label)
            .record(started.elapsed().as_secs_f64());

        let completion = match outcome {
            Ok(product_id) => {
                self.record_product(correlation_id, product_id);
                self.set_state(correlation_id, SagaState::Completed, None);
                metrics::counter!("saga_completed_total", "kind" => label).increment(1);
                tracing::info!(%correlation_id, %product_id, "saga completed");
                SagaCompletion::succeeded(correlation_id, product_id, kind)
            }
            Err(e) => {
                let product_id = self.recorded_product(correlation_id);
                if e.is_stuck() {
                    self.set_state(correlation_id, SagaState::Stuck, Some(e.to_string()));
                    metrics::counter!("saga_stuck_total", "kind" => label).increment(1);
                    tracing::error!(%correlation_id, %product_id, error = %e, "saga stuck");
                } else {
                    self.set_state(correlation_id, SagaState::Failed, Some(e.to_string()));
                    metrics::counter!("saga_failed_total", "kind" => label).increment(1);
                    tracing::warn!(%correlation_id, %product_id, error = %e, "saga failed");
                }
                SagaCompletion::failed(correlation_id, product_id, kind, e.to_string())
            }
        };

        events::publish(self.bus.as_ref(), &completion).await?;
        Ok(())
    }

    /// Records a new saga. Returns false if the intent was already seen.
    fn begin_saga(
        &self,
        correlation_id: CorrelationId,
        kind: CompletionKind,
        product_id: ProductId,
    ) -> bool {
        self.prune();

        match self.sagas.entry(correlation_id) {
            Entry::Occupied(existing) => {
                metrics::counter!("saga_duplicate_intents_total").increment(1);
                tracing::info!(
                    %correlation_id,
                    state = %existing.get().state,
                    "duplicate intent ignored"
                );
                false
            }
            Entry::Vacant(entry) => {
                let now = Utc::now();
                entry.insert(SagaRecord {
                    correlation_id,
                    kind,
                    product_id,
                    state: SagaState::Running,
                    error: None,
                    started_at: now,
                    updated_at: now,
                });
                metrics::counter!("saga_started_total", "kind" => kind.as_str()).increment(1);
                true
            }
        }
    }

    /// Forgets finished sagas older than the dedupe window. Stuck sagas stay.
    fn prune(&self) {
        let now = Utc::now();
        let window = self.config.dedupe_window;
        self.sagas.retain(|_, record| {
            let expired = (now - record.updated_at)
                .to_std()
                .is_ok_and(|age| age > window);
            !(record.state.is_prunable() && expired)
        });
    }

    fn set_state(&self, correlation_id: CorrelationId, state: SagaState, error: Option<String>) {
        if let Some(mut record) = self.sagas.get_mut(&correlation_id) {
            if !record.state.can_transition_to(state) {
                tracing::warn!(
                    %correlation_id,
                    from = %record.state,
                    to = %state,
                    "illegal saga state transition ignored"
                );
                return;
            }
            record.state = state;
            if error.is_some() {
                record.error = error;
            }
            record.updated_at = Utc::now();
        }
    }

    fn record_product(&self, correlation_id: CorrelationId, product_id: ProductId) {
        if let Some(mut record) = self.sagas.get_mut(&correlation_id) {
            record.product_id = product_id;
        }
    }

    fn recorded_product(&self, correlation_id: CorrelationId) -> ProductId {
        self.sagas
            .get(&correlation_id)
            .map(|r| r.product_id)
            .unwrap_or(ProductId::UNASSIGNED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::InMemoryProductStore;
    use event_bus::InMemoryEventBus;

    fn coordinator() -> SagaCoordinator<InMemoryProductStore, InMemoryEventBus> {
        SagaCoordinator::new(
            Arc::new(InMemoryProductStore::new()),
            Arc::new(InMemoryEventBus::new()),
            CoordinatorConfig::default(),
        )
    }

    #[test]
    fn stuck_saga_stays_stuck() {
        let coordinator = coordinator();
        let id = CorrelationId::new();
        assert!(coordinator.begin_saga(id, CompletionKind::Delete, ProductId::new(3)));

        coordinator.set_state(id, SagaState::Compensating, Some("image failed".to_string()));
        coordinator.set_state(id, SagaState::Stuck, Some("rollback failed".to_string()));
        coordinator.set_state(id, SagaState::Completed, None);

        let record = coordinator.saga(id).unwrap();
        assert_eq!(record.state, SagaState::Stuck);
        assert_eq!(record.error.as_deref(), Some("rollback failed"));
    }

    #[test]
    fn running_saga_cannot_skip_compensation() {
        let coordinator = coordinator();
        let id = CorrelationId::new();
        assert!(coordinator.begin_saga(id, CompletionKind::Create, ProductId::UNASSIGNED));

        coordinator.set_state(id, SagaState::Stuck, Some("rollback failed".to_string()));
        assert_eq!(coordinator.saga(id).unwrap().state, SagaState::Running);

        coordinator.set_state(id, SagaState::Failed, Some("name is required".to_string()));
        assert_eq!(coordinator.saga(id).unwrap().state, SagaState::Failed);
    }
}
