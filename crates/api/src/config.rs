//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use saga::{CoordinatorConfig, InitiatorConfig, ReconcilerConfig};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset runs on the
///   in-memory product store
/// - `IMAGE_STORAGE_PATH`: directory for product images (default: `/tmp/images`)
/// - `IMAGE_BASE_URL`: URL prefix images are served under
///   (default: `http://localhost:3000/images`)
/// - `SAGA_CREATE_TIMEOUT_SECS`, `SAGA_DELETE_TIMEOUT_SECS`: how long the
///   admin API waits for a saga (defaults: 10, 5)
/// - `SAGA_IMAGE_TIMEOUT_SECS`: how long a saga waits for the image
///   service before compensating (default: 30)
/// - `RECONCILE_INTERVAL_SECS`, `RECONCILE_STALE_AFTER_SECS`: reconciler
///   sweep period and staleness threshold (defaults: 60, 300)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub image_storage_path: PathBuf,
    pub image_base_url: String,
    pub create_timeout: Duration,
    pub delete_timeout: Duration,
    pub image_timeout: Duration,
    pub reconcile_interval: Duration,
    pub reconcile_stale_after: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from `lookup`. Unparseable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            image_storage_path: lookup("IMAGE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_storage_path),
            image_base_url: lookup("IMAGE_BASE_URL").unwrap_or(defaults.image_base_url),
            create_timeout: secs("SAGA_CREATE_TIMEOUT_SECS", defaults.create_timeout),
            delete_timeout: secs("SAGA_DELETE_TIMEOUT_SECS", defaults.delete_timeout),
            image_timeout: secs("SAGA_IMAGE_TIMEOUT_SECS", defaults.image_timeout),
            reconcile_interval: secs("RECONCILE_INTERVAL_SECS", defaults.reconcile_interval),
            reconcile_stale_after: secs(
                "RECONCILE_STALE_AFTER_SECS",
                defaults.reconcile_stale_after,
            ),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn initiator(&self) -> InitiatorConfig {
        InitiatorConfig {
            create_timeout: self.create_timeout,
            delete_timeout: self.delete_timeout,
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            image_timeout: self.image_timeout,
            ..CoordinatorConfig::default()
        }
    }

    pub fn reconciler(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            interval: self.reconcile_interval,
            stale_after: self.reconcile_stale_after,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            image_storage_path: PathBuf::from("/tmp/images"),
            image_base_url: "http://localhost:3000/images".to_string(),
            create_timeout: Duration::from_secs(10),
            delete_timeout: Duration::from_secs(5),
            image_timeout: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(60),
            reconcile_stale_after: Duration::from_secs(300),
        }
    }
}
