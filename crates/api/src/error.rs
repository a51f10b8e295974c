//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::ProductError;
use image::ImageError;
use saga::{InitiatorError, SagaError};

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Product store error.
    Store(ProductError),
    /// A saga could not be started.
    Initiator(InitiatorError),
    /// A saga ran and failed.
    SagaFailed(String),
    /// The saga did not finish in time; its outcome is unknown.
    SagaTimedOut,
    /// The wait was cancelled by server shutdown.
    Cancelled,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Initiator(err) => initiator_error_to_response(err),
            ApiError::SagaFailed(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::SagaTimedOut => (
                StatusCode::GATEWAY_TIMEOUT,
                "Saga outcome unknown; it may still complete".to_string(),
            ),
            ApiError::Cancelled => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down".to_string(),
            ),
        };

        if status.is_server_error() && status != StatusCode::GATEWAY_TIMEOUT {
            tracing::error!(%status, error = %message, "request failed");
        }

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: ProductError) -> (StatusCode, String) {
    match &err {
        ProductError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        ProductError::InvalidState { .. } | ProductError::AlreadyExists(_) => {
            (StatusCode::CONFLICT, err.to_string())
        }
        ProductError::InvalidPrice(_) | ProductError::Validation(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn initiator_error_to_response(err: InitiatorError) -> (StatusCode, String) {
    match &err {
        InitiatorError::Validation(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        InitiatorError::Publish(_) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        InitiatorError::DuplicateCorrelation(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<ProductError> for ApiError {
    fn from(err: ProductError) -> Self {
        ApiError::Store(err)
    }
}

impl From<InitiatorError> for ApiError {
    fn from(err: InitiatorError) -> Self {
        ApiError::Initiator(err)
    }
}

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Image store: {0}")]
    Image(#[from] ImageError),

    #[error("Saga services: {0}")]
    Saga(#[from] SagaError),

    #[error("Saga initiator: {0}")]
    Initiator(#[from] InitiatorError),
}
