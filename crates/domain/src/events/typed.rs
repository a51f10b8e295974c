//! Typed event families, validated when decoded from the wire form.

use common::{CorrelationId, ProductId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::exchange;
use super::{EventType, LifecycleEvent, LifecycleMessage};
use crate::EventError;
use crate::product::ProductChanges;

/// Raw image bytes and the name they were uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub data: Vec<u8>,
    pub filename: String,
}

impl ImagePayload {
    pub fn new(data: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            data,
            filename: filename.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Product intents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CreateProduct {
    pub correlation_id: CorrelationId,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub image: Option<ImagePayload>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateProduct {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub changes: ProductChanges,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteProduct {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub image_url: Option<String>,
}

/// Requests published by the initiator on the `products` exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LifecycleMessage", into = "LifecycleMessage")]
pub enum ProductIntent {
    Create(CreateProduct),
    Update(UpdateProduct),
    Delete(DeleteProduct),
}

impl TryFrom<LifecycleMessage> for ProductIntent {
    type Error = EventError;

    fn try_from(msg: LifecycleMessage) -> Result<Self, Self::Error> {
        let correlation_id = correlation(&msg)?;
        match msg.event_type {
            EventType::ProductCreating => {
                let name = required_text(&msg, "name", msg.name.clone())?;
                let price = msg.price.ok_or_else(|| missing(&msg, "price"))?;
                let image = msg.image_data.clone().filter(|data| !data.is_empty()).map(|data| {
                    ImagePayload::new(data, msg.filename.clone().unwrap_or_default())
                });
                Ok(ProductIntent::Create(CreateProduct {
                    correlation_id,
                    name,
                    description: msg.description.unwrap_or_default(),
                    price,
                    image,
                }))
            }
            EventType::ProductUpdating => Ok(ProductIntent::Update(UpdateProduct {
                correlation_id,
                product_id: assigned(&msg)?,
                changes: ProductChanges {
                    name: msg.name,
                    description: msg.description,
                    price: msg.price,
                },
            })),
            EventType::ProductDeleted => Ok(ProductIntent::Delete(DeleteProduct {
                correlation_id,
                product_id: assigned(&msg)?,
                image_url: non_empty(msg.image_url),
            })),
            other => Err(unexpected(other, "product intent")),
        }
    }
}

impl From<ProductIntent> for LifecycleMessage {
    fn from(intent: ProductIntent) -> Self {
        match intent {
            ProductIntent::Create(create) => {
                let mut msg = LifecycleMessage::new(
                    EventType::ProductCreating,
                    create.correlation_id,
                    ProductId::UNASSIGNED,
                );
                msg.name = Some(create.name);
                msg.description = Some(create.description);
                msg.price = Some(create.price);
                if let Some(image) = create.image {
                    msg.image_data = Some(image.data);
                    msg.filename = Some(image.filename);
                }
                msg
            }
            ProductIntent::Update(update) => {
                let mut msg = LifecycleMessage::new(
                    EventType::ProductUpdating,
                    update.correlation_id,
                    update.product_id,
                );
                msg.name = update.changes.name;
                msg.description = update.changes.description;
                msg.price = update.changes.price;
                msg
            }
            ProductIntent::Delete(delete) => {
                let mut msg = LifecycleMessage::new(
                    EventType::ProductDeleted,
                    delete.correlation_id,
                    delete.product_id,
                );
                msg.image_url = delete.image_url;
                msg
            }
        }
    }
}

impl LifecycleEvent for ProductIntent {
    fn event_type(&self) -> EventType {
        match self {
            ProductIntent::Create(_) => EventType::ProductCreating,
            ProductIntent::Update(_) => EventType::ProductUpdating,
            ProductIntent::Delete(_) => EventType::ProductDeleted,
        }
    }

    fn exchange(&self) -> &'static str {
        exchange::PRODUCTS
    }

    fn correlation_id(&self) -> CorrelationId {
        match self {
            ProductIntent::Create(c) => c.correlation_id,
            ProductIntent::Update(u) => u.correlation_id,
            ProductIntent::Delete(d) => d.correlation_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Image intents
// ---------------------------------------------------------------------------

/// Why an image is being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorePurpose {
    /// First image of a product being created; answered with `image.created`.
    Create,
    /// Replacement upload for an existing product; answered with `image.processed`.
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreImage {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub image: ImagePayload,
    pub purpose: StorePurpose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteImage {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub image_url: Option<String>,
}

/// Requests handled by the image service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LifecycleMessage", into = "LifecycleMessage")]
pub enum ImageIntent {
    Store(StoreImage),
    Delete(DeleteImage),
}

impl TryFrom<LifecycleMessage> for ImageIntent {
    type Error = EventError;

    fn try_from(msg: LifecycleMessage) -> Result<Self, Self::Error> {
        let correlation_id = correlation(&msg)?;
        let purpose = match msg.event_type {
            EventType::ProductCreating => StorePurpose::Create,
            EventType::ImageUploaded => StorePurpose::Replace,
            EventType::ProductDeleted => {
                return Ok(ImageIntent::Delete(DeleteImage {
                    correlation_id,
                    product_id: assigned(&msg)?,
                    image_url: non_empty(msg.image_url),
                }));
            }
            other => return Err(unexpected(other, "image intent")),
        };

        let product_id = assigned(&msg)?;
        let data = msg
            .image_data
            .clone()
            .filter(|data| !data.is_empty())
            .ok_or_else(|| missing(&msg, "image_data"))?;
        Ok(ImageIntent::Store(StoreImage {
            correlation_id,
            product_id,
            image: ImagePayload::new(data, msg.filename.unwrap_or_default()),
            purpose,
        }))
    }
}

impl From<ImageIntent> for LifecycleMessage {
    fn from(intent: ImageIntent) -> Self {
        match intent {
            ImageIntent::Store(store) => {
                let event_type = match store.purpose {
                    StorePurpose::Create => EventType::ProductCreating,
                    StorePurpose::Replace => EventType::ImageUploaded,
                };
                let mut msg =
                    LifecycleMessage::new(event_type, store.correlation_id, store.product_id);
                msg.image_data = Some(store.image.data);
                msg.filename = Some(store.image.filename);
                msg
            }
            ImageIntent::Delete(delete) => {
                let mut msg = LifecycleMessage::new(
                    EventType::ProductDeleted,
                    delete.correlation_id,
                    delete.product_id,
                );
                msg.image_url = delete.image_url;
                msg
            }
        }
    }
}

impl LifecycleEvent for ImageIntent {
    fn event_type(&self) -> EventType {
        match self {
            ImageIntent::Store(s) if s.purpose == StorePurpose::Create => {
                EventType::ProductCreating
            }
            ImageIntent::Store(_) => EventType::ImageUploaded,
            ImageIntent::Delete(_) => EventType::ProductDeleted,
        }
    }

    fn exchange(&self) -> &'static str {
        match self {
            ImageIntent::Store(s) if s.purpose == StorePurpose::Create => {
                exchange::IMAGES_CREATING
            }
            ImageIntent::Store(_) => exchange::PRODUCT_IMAGES,
            ImageIntent::Delete(_) => exchange::IMAGES_DELETING,
        }
    }

    fn correlation_id(&self) -> CorrelationId {
        match self {
            ImageIntent::Store(s) => s.correlation_id,
            ImageIntent::Delete(d) => d.correlation_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Image results
// ---------------------------------------------------------------------------

/// Which request an image result answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageResultKind {
    /// Store for a product being created.
    Created,
    /// Store for a replacement upload.
    Processed,
    /// Delete.
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Stored { url: String },
    Deleted,
    Failed { error: String },
}

/// Outcome reported by the image service on the `products_images` exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LifecycleMessage", into = "LifecycleMessage")]
pub struct ImageResult {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub kind: ImageResultKind,
    pub outcome: ImageOutcome,
}

impl ImageResult {
    pub fn stored(
        correlation_id: CorrelationId,
        product_id: ProductId,
        kind: ImageResultKind,
        url: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            product_id,
            kind,
            outcome: ImageOutcome::Stored { url: url.into() },
        }
    }

    pub fn deleted(correlation_id: CorrelationId, product_id: ProductId) -> Self {
        Self {
            correlation_id,
            product_id,
            kind: ImageResultKind::Deleted,
            outcome: ImageOutcome::Deleted,
        }
    }

    pub fn failed(
        correlation_id: CorrelationId,
        product_id: ProductId,
        kind: ImageResultKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            product_id,
            kind,
            outcome: ImageOutcome::Failed {
                error: error.into(),
            },
        }
    }

    /// Returns the error message if the image operation failed.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            ImageOutcome::Failed { error } => Some(error),
            _ => None,
        }
    }
}

impl TryFrom<LifecycleMessage> for ImageResult {
    type Error = EventError;

    fn try_from(msg: LifecycleMessage) -> Result<Self, Self::Error> {
        let correlation_id = correlation(&msg)?;
        let kind = match msg.event_type {
            EventType::ImageCreated => ImageResultKind::Created,
            EventType::ImageProcessed => ImageResultKind::Processed,
            EventType::ImageDeleted => ImageResultKind::Deleted,
            other => return Err(unexpected(other, "image result")),
        };
        let product_id = assigned(&msg)?;

        let outcome = match non_empty(msg.error.clone()) {
            Some(error) => ImageOutcome::Failed { error },
            None if kind == ImageResultKind::Deleted => ImageOutcome::Deleted,
            None => ImageOutcome::Stored {
                url: required_text(&msg, "image_url", msg.image_url.clone())?,
            },
        };

        Ok(ImageResult {
            correlation_id,
            product_id,
            kind,
            outcome,
        })
    }
}

impl From<ImageResult> for LifecycleMessage {
    fn from(result: ImageResult) -> Self {
        let event_type = result.event_type();
        let mut msg = LifecycleMessage::new(event_type, result.correlation_id, result.product_id);
        match result.outcome {
            ImageOutcome::Stored { url } => msg.image_url = Some(url),
            ImageOutcome::Deleted => {}
            ImageOutcome::Failed { error } => msg.error = Some(error),
        }
        msg
    }
}

impl LifecycleEvent for ImageResult {
    fn event_type(&self) -> EventType {
        match self.kind {
            ImageResultKind::Created => EventType::ImageCreated,
            ImageResultKind::Processed => EventType::ImageProcessed,
            ImageResultKind::Deleted => EventType::ImageDeleted,
        }
    }

    fn exchange(&self) -> &'static str {
        exchange::PRODUCT_IMAGES
    }

    fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

// ---------------------------------------------------------------------------
// Saga completions
// ---------------------------------------------------------------------------

/// Which saga finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionKind {
    Create,
    Delete,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::Create => "create",
            CompletionKind::Delete => "delete",
        }
    }
}

/// Terminal outcome of a create or delete saga.
///
/// `product_id` is unassigned when a create failed before a row existed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LifecycleMessage", into = "LifecycleMessage")]
pub struct SagaCompletion {
    pub correlation_id: CorrelationId,
    pub product_id: ProductId,
    pub kind: CompletionKind,
    pub error: Option<String>,
}

impl SagaCompletion {
    pub fn succeeded(correlation_id: CorrelationId, product_id: ProductId, kind: CompletionKind) -> Self {
        Self {
            correlation_id,
            product_id,
            kind,
            error: None,
        }
    }

    pub fn failed(
        correlation_id: CorrelationId,
        product_id: ProductId,
        kind: CompletionKind,
        error: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id,
            product_id,
            kind,
            error: Some(error.into()),
        }
    }
}

impl TryFrom<LifecycleMessage> for SagaCompletion {
    type Error = EventError;

    fn try_from(msg: LifecycleMessage) -> Result<Self, Self::Error> {
        let correlation_id = correlation(&msg)?;
        let kind = match msg.event_type {
            EventType::ProductCreatingCompleted => CompletionKind::Create,
            EventType::ProductDeletedCompleted => CompletionKind::Delete,
            other => return Err(unexpected(other, "saga completion")),
        };
        Ok(SagaCompletion {
            correlation_id,
            product_id: msg.product_id,
            kind,
            error: non_empty(msg.error),
        })
    }
}

impl From<SagaCompletion> for LifecycleMessage {
    fn from(completion: SagaCompletion) -> Self {
        let event_type = completion.event_type();
        let mut msg =
            LifecycleMessage::new(event_type, completion.correlation_id, completion.product_id);
        msg.error = completion.error;
        msg
    }
}

impl LifecycleEvent for SagaCompletion {
    fn event_type(&self) -> EventType {
        match self.kind {
            CompletionKind::Create => EventType::ProductCreatingCompleted,
            CompletionKind::Delete => EventType::ProductDeletedCompleted,
        }
    }

    fn exchange(&self) -> &'static str {
        match self.kind {
            CompletionKind::Create => exchange::IMAGES_CREATING_COMPLETED,
            CompletionKind::Delete => exchange::IMAGES_DELETING_COMPLETED,
        }
    }

    fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }
}

// ---------------------------------------------------------------------------
// Decode helpers
// ---------------------------------------------------------------------------

fn correlation(msg: &LifecycleMessage) -> Result<CorrelationId, EventError> {
    msg.correlation_id
        .ok_or_else(|| missing(msg, "correlation_id"))
}

fn assigned(msg: &LifecycleMessage) -> Result<ProductId, EventError> {
    if msg.product_id.is_assigned() {
        Ok(msg.product_id)
    } else {
        Err(EventError::InvalidField {
            event_type: msg.event_type.to_string(),
            field: "product_id",
            reason: format!("{} is not an assigned id", msg.product_id),
        })
    }
}

fn required_text(
    msg: &LifecycleMessage,
    field: &'static str,
    value: Option<String>,
) -> Result<String, EventError> {
    non_empty(value).ok_or_else(|| missing(msg, field))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn missing(msg: &LifecycleMessage, field: &'static str) -> EventError {
    EventError::MissingField {
        event_type: msg.event_type.to_string(),
        field,
    }
}

fn unexpected(event_type: EventType, expected: &'static str) -> EventError {
    EventError::UnexpectedType {
        event_type: event_type.to_string(),
        expected,
    }
}
