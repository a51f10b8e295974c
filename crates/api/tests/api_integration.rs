//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use api::config::Config;
use api::{AppState, Backends};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::{InMemoryProductStore, ProductStore};
use event_bus::InMemoryEventBus;
use image::InMemoryImageStore;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestApp {
    app: axum::Router,
    state: Arc<AppState>,
    products: Arc<InMemoryProductStore>,
    images: Arc<InMemoryImageStore>,
    shutdown: CancellationToken,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn test_config() -> Config {
    Config {
        create_timeout: Duration::from_secs(3),
        delete_timeout: Duration::from_secs(3),
        image_timeout: Duration::from_secs(2),
        ..Config::default()
    }
}

async fn setup() -> TestApp {
    setup_with(test_config()).await
}

async fn setup_with(config: Config) -> TestApp {
    let products = Arc::new(InMemoryProductStore::new());
    let images = Arc::new(InMemoryImageStore::new(config.image_base_url.as_str()));
    let backends = Backends {
        products: products.clone(),
        images: images.clone(),
        bus: Arc::new(InMemoryEventBus::new()),
    };
    let shutdown = CancellationToken::new();
    let services = api::start(backends, &config, shutdown.clone())
        .await
        .unwrap();
    let app = api::create_app(services.state.clone(), get_metrics_handle());

    TestApp {
        app,
        state: services.state,
        products,
        images,
        shutdown,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&json).unwrap()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn create_product(app: &axum::Router, name: &str, image: Option<&str>) -> i64 {
    let mut body = serde_json::json!({
        "name": name,
        "description": "A lamp",
        "price": "19.99",
    });
    if let Some(data) = image {
        body["image"] = serde_json::json!({ "data": data, "filename": "lamp.jpg" });
    }
    let (status, json) = send(app, "POST", "/admin/products", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    json["id"].as_i64().unwrap()
}

// "jpeg" in base64
const IMAGE: &str = "anBlZw==";

#[tokio::test]
async fn test_health_check() {
    let test = setup().await;

    let (status, json) = send(&test.app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let test = setup().await;

    let response = test
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

mod create {
    use super::*;

    #[tokio::test]
    async fn test_create_without_image() {
        let test = setup().await;

        let (status, json) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({ "name": "Desk Lamp", "price": "19.99" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["name"], "Desk Lamp");
        assert_eq!(json["status"], "active");
        assert_eq!(json["price"], "19.99");
        assert!(json["image_url"].is_null());
        assert!(json["slug"].as_str().unwrap().starts_with("desk-lamp-"));
    }

    #[tokio::test]
    async fn test_create_with_image() {
        let test = setup().await;

        let id = create_product(&test.app, "Desk Lamp", Some(IMAGE)).await;

        let (status, json) = send(&test.app, "GET", &format!("/products/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            json["image_url"],
            format!("http://localhost:3000/images/{id}.jpg")
        );
        assert_eq!(test.images.len().await, 1);
    }

    #[tokio::test]
    async fn test_create_accepts_image_past_default_body_limit() {
        let test = setup().await;
        // 3.2 MB of base64, 2.4 MB decoded.
        let large = "AAAA".repeat(800_000);

        let id = create_product(&test.app, "Poster", Some(&large)).await;

        let stored = test.images.get(common::ProductId::new(id as i32)).await;
        assert_eq!(stored.map(|bytes| bytes.len()), Some(2_400_000));
    }

    #[tokio::test]
    async fn test_create_rejects_body_over_admin_limit() {
        let test = setup().await;
        let body = serde_json::json!({
            "name": "Mural",
            "price": "1",
            "image": { "data": "A".repeat(api::ADMIN_BODY_LIMIT + 1) },
        });

        let response = test
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/admin/products")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(test.products.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_rejects_sub_cent_price() {
        let test = setup().await;

        let (status, json) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({ "name": "Lamp", "price": "19.999" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");
        assert!(test.products.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let test = setup().await;

        let (status, _) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({ "name": "Lamp", "price": "-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({ "name": "  ", "price": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({
                "name": "Lamp",
                "price": "1",
                "image": { "data": "not base64!" }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(test.products.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_image_failure_is_unprocessable() {
        let test = setup().await;
        test.images.set_fail_stores(true).await;

        let (status, json) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({
                "name": "Lamp",
                "price": "1",
                "image": { "data": IMAGE }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json["error"].as_str().is_some());
        assert!(test.products.is_empty().await);
    }

    #[tokio::test]
    async fn test_create_timeout_is_gateway_timeout() {
        let test = setup_with(Config {
            create_timeout: Duration::from_millis(100),
            image_timeout: Duration::from_secs(2),
            ..test_config()
        })
        .await;
        test.images.set_delay(Some(Duration::from_millis(500))).await;

        let (status, _) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({
                "name": "Lamp",
                "price": "1",
                "image": { "data": IMAGE }
            })),
        )
        .await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_create_during_shutdown_is_unavailable() {
        let test = setup().await;
        test.state.shutdown.cancel();

        let (status, _) = send(
            &test.app,
            "POST",
            "/admin/products",
            Some(serde_json::json!({ "name": "Lamp", "price": "1" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn test_list_shows_active_products_only() {
        let test = setup().await;
        create_product(&test.app, "Desk Lamp", None).await;
        create_product(&test.app, "Floor Lamp", Some(IMAGE)).await;
        test.products
            .begin_create(&domain::NewProduct::new("Hidden", "", rust_decimal::Decimal::ONE))
            .await
            .unwrap();

        let (status, json) = send(&test.app, "GET", "/products", None).await;

        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Desk Lamp", "Floor Lamp"]);
    }

    #[tokio::test]
    async fn test_get_missing_product() {
        let test = setup().await;

        let (status, json) = send(&test.app, "GET", "/products/999", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("999"));
    }
}

mod delete {
    use super::*;

    #[tokio::test]
    async fn test_delete_product_with_image() {
        let test = setup().await;
        let id = create_product(&test.app, "Desk Lamp", Some(IMAGE)).await;

        let (status, json) =
            send(&test.app, "DELETE", &format!("/admin/products/{id}"), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["product_id"], id);
        let (status, _) = send(&test.app, "GET", &format!("/products/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(test.images.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_missing_product() {
        let test = setup().await;

        let (status, _) = send(&test.app, "DELETE", "/admin/products/42", None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_image_failure_keeps_product() {
        let test = setup().await;
        let id = create_product(&test.app, "Desk Lamp", Some(IMAGE)).await;
        test.images.set_fail_deletes(true).await;

        let (status, _) = send(&test.app, "DELETE", &format!("/admin/products/{id}"), None).await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let (status, json) = send(&test.app, "GET", &format!("/products/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "active");
    }
}

mod updates {
    use super::*;

    async fn wait_for(test: &TestApp, id: i64, check: impl Fn(&serde_json::Value) -> bool) {
        for _ in 0..100 {
            let (_, json) = send(&test.app, "GET", &format!("/products/{id}"), None).await;
            if check(&json) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("product {id} never reached the expected state");
    }

    #[tokio::test]
    async fn test_update_is_accepted_and_applied() {
        let test = setup().await;
        let id = create_product(&test.app, "Desk Lamp", None).await;

        let (status, json) = send(
            &test.app,
            "PUT",
            &format!("/admin/products/{id}"),
            Some(serde_json::json!({ "name": "Floor Lamp", "price": "0" })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert!(json["correlation_id"].as_str().is_some());
        wait_for(&test, id, |p| p["name"] == "Floor Lamp").await;

        let (_, json) = send(&test.app, "GET", &format!("/products/{id}"), None).await;
        assert_eq!(json["price"], "19.99");
        assert_eq!(json["description"], "A lamp");
    }

    #[tokio::test]
    async fn test_update_missing_product() {
        let test = setup().await;

        let (status, _) = send(
            &test.app,
            "PUT",
            "/admin/products/7",
            Some(serde_json::json!({ "name": "Floor Lamp" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_replace_image() {
        let test = setup().await;
        let id = create_product(&test.app, "Desk Lamp", None).await;

        let (status, _) = send(
            &test.app,
            "PUT",
            &format!("/admin/products/{id}/image"),
            Some(serde_json::json!({ "data": IMAGE, "filename": "new.jpg" })),
        )
        .await;

        assert_eq!(status, StatusCode::ACCEPTED);
        wait_for(&test, id, |p| p["image_url"].is_string()).await;
    }
}

#[tokio::test]
async fn test_stuck_sagas_listed() {
    let test = setup().await;
    test.images.set_fail_stores(true).await;
    test.products.set_fail_rollbacks(true).await;

    let (status, _) = send(
        &test.app,
        "POST",
        "/admin/products",
        Some(serde_json::json!({
            "name": "Lamp",
            "price": "1",
            "image": { "data": IMAGE }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = send(&test.app, "GET", "/admin/sagas/stuck", None).await;

    assert_eq!(status, StatusCode::OK);
    let stuck = json.as_array().unwrap();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0]["kind"], "create");
}
