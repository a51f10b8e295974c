//! Product image storage.
//!
//! Images are stored under a key derived from the product id and addressed
//! by URL. The [`ImageService`] answers image intents from the bus and
//! reports outcomes back; it has no knowledge of sagas.

pub mod error;
pub mod memory;
pub mod service;
pub mod store;

pub use error::{ImageError, Result};
pub use memory::InMemoryImageStore;
pub use service::ImageService;
pub use store::{FileImageStore, ImageStore, key_from_url, object_key};
