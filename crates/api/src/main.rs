//! API server entry point.

use std::sync::Arc;

use api::Backends;
use api::config::Config;
use domain::{InMemoryProductStore, PostgresProductStore, ProductStore};
use event_bus::InMemoryEventBus;
use image::FileImageStore;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn product_store(config: &Config) -> Arc<dyn ProductStore> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, products are kept in memory");
        return Arc::new(InMemoryProductStore::new());
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .expect("failed to connect to database");
    let store = PostgresProductStore::new(pool);
    store
        .run_migrations()
        .await
        .expect("failed to run migrations");
    tracing::info!("using PostgreSQL product store");
    Arc::new(store)
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Stores, bus and saga services
    let images = FileImageStore::new(config.image_storage_path.clone(), config.image_base_url.as_str())
        .await
        .expect("failed to prepare image directory");
    let backends = Backends {
        products: product_store(&config).await,
        images: Arc::new(images),
        bus: Arc::new(InMemoryEventBus::new()),
    };

    let shutdown = CancellationToken::new();
    let services = api::start(backends, &config, shutdown.clone())
        .await
        .expect("failed to start saga services");

    // 4. Build the application; stored images are served from disk
    let app = api::create_app(services.state, metrics_handle).nest_service(
        "/images",
        ServeDir::new(&config.image_storage_path),
    );

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .expect("server error");

    shutdown.cancel();
    for handle in services.handles {
        let _ = handle.await;
    }

    tracing::info!("server shut down gracefully");
}
