//! Admin endpoints that start lifecycle sagas.
//!
//! Create and delete wait for the saga outcome. Updates and image
//! replacements are published and acknowledged with `202 Accepted`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use common::ProductId;
use domain::{ImagePayload, Product, ProductChanges};
use rust_decimal::Decimal;
use saga::{CreateProductRequest, SagaOutcome, SagaRecord};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::products::ProductResponse;

// -- Request types --

/// An image upload; `data` is base64.
#[derive(Deserialize)]
pub struct ImageRequest {
    pub data: String,
    #[serde(default = "default_filename")]
    pub filename: String,
}

fn default_filename() -> String {
    "image.jpg".to_string()
}

impl ImageRequest {
    fn decode(self) -> Result<ImagePayload, ApiError> {
        let data = STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| ApiError::BadRequest(format!("Invalid image data: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("Image is empty".to_string()));
        }
        Ok(ImagePayload::new(data, self.filename))
    }
}

#[derive(Deserialize)]
pub struct CreateProductBody {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    pub image: Option<ImageRequest>,
}

/// Absent, empty and zero fields are left unchanged.
#[derive(Deserialize)]
pub struct UpdateProductBody {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
}

// -- Response types --

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub correlation_id: String,
}

#[derive(Serialize)]
pub struct DeletedResponse {
    pub product_id: i32,
}

#[derive(Serialize)]
pub struct StuckSagaResponse {
    pub correlation_id: String,
    pub kind: String,
    pub product_id: i32,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SagaRecord> for StuckSagaResponse {
    fn from(record: SagaRecord) -> Self {
        Self {
            correlation_id: record.correlation_id.to_string(),
            kind: record.kind.as_str().to_string(),
            product_id: record.product_id.as_i32(),
            error: record.error,
            started_at: record.started_at,
            updated_at: record.updated_at,
        }
    }
}

// -- Handlers --

/// POST /admin/products: runs the create saga and waits for it.
#[tracing::instrument(skip(state, body), fields(name = %body.name))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateProductBody>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let image = body.image.map(ImageRequest::decode).transpose()?;

    let outcome = state
        .initiator
        .create_product(
            CreateProductRequest {
                name: body.name,
                description: body.description,
                price: body.price,
                image,
            },
            state.shutdown.child_token(),
        )
        .await?;
    let product_id = completed(outcome)?;

    // A concurrent delete may already have removed the row.
    let product = load(&state, product_id).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PUT /admin/products/{id}: publishes a metadata update.
#[tracing::instrument(skip(state, body))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<UpdateProductBody>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let product = load(&state, ProductId::new(id)).await?;

    let correlation_id = state
        .initiator
        .update_product(
            product.id,
            ProductChanges {
                name: body.name,
                description: body.description,
                price: body.price,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            correlation_id: correlation_id.to_string(),
        }),
    ))
}

/// PUT /admin/products/{id}/image: publishes a replacement image.
#[tracing::instrument(skip(state, body))]
pub async fn replace_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(body): Json<ImageRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let image = body.decode()?;
    let product = load(&state, ProductId::new(id)).await?;

    let correlation_id = state.initiator.replace_image(product.id, image).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            correlation_id: correlation_id.to_string(),
        }),
    ))
}

/// DELETE /admin/products/{id}: runs the delete saga and waits for it.
#[tracing::instrument(skip(state))]
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let product = load(&state, ProductId::new(id)).await?;

    let outcome = state
        .initiator
        .delete_product(product.id, product.image_url, state.shutdown.child_token())
        .await?;
    let product_id = completed(outcome)?;

    Ok(Json(DeletedResponse {
        product_id: product_id.as_i32(),
    }))
}

/// GET /admin/sagas/stuck: sagas whose compensation failed.
pub async fn stuck_sagas(State(state): State<Arc<AppState>>) -> Json<Vec<StuckSagaResponse>> {
    Json(
        state
            .coordinator
            .stuck_sagas()
            .into_iter()
            .map(StuckSagaResponse::from)
            .collect(),
    )
}

async fn load(state: &AppState, id: ProductId) -> Result<Product, ApiError> {
    state
        .products
        .get(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product {id} not found")))
}

fn completed(outcome: SagaOutcome) -> Result<ProductId, ApiError> {
    match outcome {
        SagaOutcome::Completed(product_id) => Ok(product_id),
        SagaOutcome::Failed(error) => Err(ApiError::SagaFailed(error)),
        SagaOutcome::TimedOut => Err(ApiError::SagaTimedOut),
        SagaOutcome::Cancelled => Err(ApiError::Cancelled),
    }
}
