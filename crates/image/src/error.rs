use thiserror::Error;

/// Errors from image storage and the image service.
#[derive(Debug, Error)]
pub enum ImageError {
    /// Zero-length uploads are never stored.
    #[error("Image payload is empty")]
    EmptyPayload,

    /// The key derived from a URL or product id is unusable.
    #[error("Invalid image key: {0}")]
    InvalidKey(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing store refused the operation.
    #[error("Image storage unavailable: {0}")]
    Unavailable(String),

    /// Publishing a result failed.
    #[error("Bus error: {0}")]
    Bus(#[from] event_bus::BusError),
}

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, ImageError>;
