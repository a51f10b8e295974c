//! Saga error types.

use std::time::Duration;

use common::{CorrelationId, ProductId};
use domain::ProductError;
use event_bus::BusError;
use thiserror::Error;

/// Errors that can occur while a saga runs in the coordinator.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A product store step failed.
    #[error("Product store error: {0}")]
    Store(#[from] ProductError),

    /// Publishing or subscribing failed.
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    /// The image service reported a failure.
    #[error("Image operation failed: {0}")]
    ImageFailed(String),

    /// No image result arrived within the coordinator's own bound.
    #[error("No image result within {0:?}")]
    ImageTimeout(Duration),

    /// A waiter is already registered for this correlation id.
    #[error("Correlation id {0} is already in flight")]
    DuplicateCorrelation(CorrelationId),

    /// Compensation failed after a forward step failed. The product row is
    /// left in a non-terminal status.
    #[error("Saga stuck: {step} failed for product {product_id}: {reason} (after: {cause})")]
    Stuck {
        product_id: ProductId,
        step: &'static str,
        reason: String,
        cause: String,
    },
}

impl SagaError {
    /// Returns true if the saga could not be compensated.
    pub fn is_stuck(&self) -> bool {
        matches!(self, SagaError::Stuck { .. })
    }
}

/// Errors returned to the caller of the initiator before any wait begins.
///
/// Saga outcomes, including failure and timeout, are not errors; see
/// `SagaOutcome`.
#[derive(Debug, Error)]
pub enum InitiatorError {
    /// The request was rejected before anything was published.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The intent could not be published.
    #[error("Failed to publish intent: {0}")]
    Publish(#[from] BusError),

    /// A waiter is already registered for this correlation id.
    #[error("Correlation id {0} is already in flight")]
    DuplicateCorrelation(CorrelationId),
}

impl From<ProductError> for InitiatorError {
    fn from(e: ProductError) -> Self {
        InitiatorError::Validation(e.to_string())
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
