//! Repair of rows left behind by sagas that never finished.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::CorrelationId;
use domain::events;
use domain::{DeleteImage, ImageIntent, Product, ProductStatus, ProductStore};
use event_bus::EventBus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::Result;

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Rows in `pending` or `deleting` untouched for longer than this are
    /// repaired. Must stay well above the coordinator's image timeout.
    pub stale_after: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(300),
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Stale `pending` rows removed.
    pub rolled_back: usize,
    /// Stale `deleting` rows removed.
    pub rolled_forward: usize,
    /// Rows another saga resolved during the sweep.
    pub skipped: usize,
    /// Rows that could not be repaired this time.
    pub failed: usize,
}

/// Periodic sweep over orphaned non-terminal rows.
///
/// A stale `pending` row is rolled back and its canonical image, if the
/// image service stored one late, is deleted. A stale `deleting` row is
/// rolled forward: image delete intent first, then the row is removed.
pub struct Reconciler<P: ?Sized, B: ?Sized> {
    store: Arc<P>,
    bus: Arc<B>,
    config: ReconcilerConfig,
}

impl<P, B> Reconciler<P, B>
where
    P: ProductStore + ?Sized + 'static,
    B: EventBus + ?Sized + 'static,
{
    pub fn new(store: Arc<P>, bus: Arc<B>, config: ReconcilerConfig) -> Self {
        Self { store, bus, config }
    }

    /// Spawns the sweep loop. The first sweep runs after one interval.
    pub fn run(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            tracing::error!(error = %e, "reconcile sweep failed");
                        }
                    }
                }
            }

            tracing::info!("reconciler stopped");
        })
    }

    /// Repairs every row that has been stale for longer than `stale_after`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep(&self) -> Result<ReconcileReport> {
        let stale_after = chrono::Duration::from_std(self.config.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let cutoff = Utc::now() - stale_after;

        let stale = self
            .store
            .find_stale(&[ProductStatus::Pending, ProductStatus::Deleting], cutoff)
            .await?;

        let mut report = ReconcileReport::default();
        for product in stale {
            let repaired = match product.status {
                ProductStatus::Pending => self.roll_back_create(&product).await,
                ProductStatus::Deleting => self.roll_forward_delete(&product).await,
                ProductStatus::Active => continue,
            };

            match repaired {
                Ok(true) => {
                    let action = match product.status {
                        ProductStatus::Pending => {
                            report.rolled_back += 1;
                            "rollback_create"
                        }
                        _ => {
                            report.rolled_forward += 1;
                            "complete_delete"
                        }
                    };
                    metrics::counter!("reconciler_repaired_total", "action" => action)
                        .increment(1);
                    tracing::info!(product_id = %product.id, action, "stale product repaired");
                }
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(product_id = %product.id, error = %e, "failed to repair stale product");
                }
            }
        }

        if report != ReconcileReport::default() {
            tracing::info!(?report, "reconcile sweep finished");
        }
        Ok(report)
    }

    /// Returns false if the row moved on before we got to it.
    async fn roll_back_create(&self, product: &Product) -> Result<bool> {
        match self.store.rollback_create(product.id).await {
            Ok(()) => {}
            Err(e) if e.is_state_conflict() => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        // The row is gone either way; a leftover image is only garbage.
        if let Err(e) = self.publish_image_delete(product).await {
            tracing::warn!(product_id = %product.id, error = %e, "failed to request image cleanup");
        }
        Ok(true)
    }

    async fn roll_forward_delete(&self, product: &Product) -> Result<bool> {
        self.publish_image_delete(product).await?;

        match self.store.complete_delete(product.id).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_state_conflict() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn publish_image_delete(&self, product: &Product) -> Result<()> {
        let intent = ImageIntent::Delete(DeleteImage {
            correlation_id: CorrelationId::new(),
            product_id: product.id,
            image_url: product.image_url.clone(),
        });
        events::publish(self.bus.as_ref(), &intent).await?;
        Ok(())
    }
}
