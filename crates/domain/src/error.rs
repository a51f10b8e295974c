//! Domain error types.

use common::ProductId;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::product::ProductStatus;

/// Errors returned by product stores and product validation.
#[derive(Debug, Error)]
pub enum ProductError {
    /// The insert itself failed on a uniqueness constraint.
    #[error("Product already exists: {0}")]
    AlreadyExists(String),

    /// No row matched the identifier.
    #[error("Product not found: {0}")]
    NotFound(ProductId),

    /// The guarded transition matched zero rows: the row is missing or not in
    /// the expected pre-state.
    #[error("Product {id} is not in {expected} state")]
    InvalidState {
        id: ProductId,
        expected: ProductStatus,
    },

    /// Prices are never negative and fit `NUMERIC(12, 2)` exactly.
    #[error("Invalid price: {0} (must be 0 to 9999999999.99 with at most two decimals)")]
    InvalidPrice(Decimal),

    /// Input failed validation before reaching the store.
    #[error("Invalid product: {0}")]
    Validation(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A non-database storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ProductError {
    /// Returns true if the error means the row was not where the caller
    /// expected it: a lost race or an already settled saga.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            ProductError::InvalidState { .. } | ProductError::NotFound(_)
        )
    }
}

/// Errors raised when a wire message does not form a valid typed event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The discriminator does not belong to the expected event family.
    #[error("Unexpected event type {event_type} for {expected}")]
    UnexpectedType {
        event_type: String,
        expected: &'static str,
    },

    /// A field the variant requires is absent or empty.
    #[error("Missing field {field} in {event_type} event")]
    MissingField {
        event_type: String,
        field: &'static str,
    },

    /// A field is present but unusable.
    #[error("Invalid field {field} in {event_type} event: {reason}")]
    InvalidField {
        event_type: String,
        field: &'static str,
        reason: String,
    },
}

/// Result type for product store operations.
pub type Result<T> = std::result::Result<T, ProductError>;
