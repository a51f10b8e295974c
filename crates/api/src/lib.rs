//! HTTP API server for the storefront product lifecycle.
//!
//! Plays the initiator role: admin endpoints start create and delete sagas
//! and wait for their outcome, catalog endpoints read the product store.
//! The coordinator, image service and reconciler run in the same process
//! and talk to each other only over the event bus.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use domain::ProductStore;
use event_bus::EventBus;
use image::{ImageService, ImageStore};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{Reconciler, SagaCoordinator, SagaInitiator};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::error::StartupError;

/// Largest admin request body: a 16 MiB JSON document, enough for about
/// 12 MiB of base64 image data.
pub const ADMIN_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub products: Arc<dyn ProductStore>,
    pub initiator: Arc<SagaInitiator<dyn EventBus>>,
    pub coordinator: Arc<SagaCoordinator<dyn ProductStore, dyn EventBus>>,
    /// Cancelled on server shutdown; handlers stop waiting for sagas.
    pub shutdown: CancellationToken,
}

/// The stores and bus the services run on.
pub struct Backends {
    pub products: Arc<dyn ProductStore>,
    pub images: Arc<dyn ImageStore>,
    pub bus: Arc<dyn EventBus>,
}

/// Running saga services and the state handlers share.
pub struct Services {
    pub state: Arc<AppState>,
    pub handles: Vec<JoinHandle<()>>,
}

/// Starts the image service, coordinator, initiator and reconciler on
/// `backends`. Every task stops when `shutdown` is cancelled.
pub async fn start(
    backends: Backends,
    config: &Config,
    shutdown: CancellationToken,
) -> Result<Services, StartupError> {
    let Backends {
        products,
        images,
        bus,
    } = backends;
    let mut handles = Vec::new();

    let image_service = Arc::new(ImageService::new(images, Arc::clone(&bus)));
    handles.extend(image_service.run(shutdown.clone()).await?);

    let coordinator = Arc::new(SagaCoordinator::new(
        Arc::clone(&products),
        Arc::clone(&bus),
        config.coordinator(),
    ));
    handles.extend(Arc::clone(&coordinator).run(shutdown.clone()).await?);

    let initiator = Arc::new(SagaInitiator::new(Arc::clone(&bus), config.initiator()));
    handles.extend(Arc::clone(&initiator).run(shutdown.clone()).await?);

    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&products),
        bus,
        config.reconciler(),
    ));
    handles.push(reconciler.run(shutdown.clone()));

    tracing::info!(tasks = handles.len(), "saga services started");

    Ok(Services {
        state: Arc::new(AppState {
            products,
            initiator,
            coordinator,
            shutdown,
        }),
        handles,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    // Admin bodies carry base64 images, well past axum's 2 MB default.
    let admin_router = Router::new()
        .route("/admin/products", post(routes::admin::create))
        .route(
            "/admin/products/{id}",
            put(routes::admin::update).delete(routes::admin::delete),
        )
        .route("/admin/products/{id}/image", put(routes::admin::replace_image))
        .route("/admin/sagas/stuck", get(routes::admin::stuck_sagas))
        .layer(DefaultBodyLimit::max(ADMIN_BODY_LIMIT));

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/products", get(routes::products::list))
        .route("/products/{id}", get(routes::products::get))
        .merge(admin_router)
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
