// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::helpers::{plain_snapshot, InMemoryProductRepository, InMemoryTaskRepository};
use asinrs::domain::models::product::{ItemKey, ProductRecord};
use asinrs::domain::repositories::product_repository::ProductRepository;
use asinrs::domain::repositories::task_repository::TaskRepository;
use asinrs::domain::services::change_detection::structural_digest;
use asinrs::domain::services::freshness::FreshnessPolicy;
use asinrs::engines::session_limiter::SessionLimiter;
use asinrs::presentation::handlers::AppState;
use asinrs::presentation::routes::routes;
use asinrs::queue::task_queue::AdmissionQueue;

struct TestApp {
    router: Router,
    products: Arc<InMemoryProductRepository>,
    tasks: Arc<InMemoryTaskRepository>,
    queue: AdmissionQueue,
}

fn create_test_app() -> TestApp {
    let products = Arc::new(InMemoryProductRepository::new());
    let tasks = Arc::new(InMemoryTaskRepository::new());
    let queue = AdmissionQueue::new();
    let state = AppState {
        tasks: tasks.clone(),
        products: products.clone(),
        queue: queue.clone(),
        freshness: FreshnessPolicy::new(chrono::Duration::hours(24)),
        limiter: SessionLimiter::new(4),
        active_workers: Arc::new(AtomicUsize::new(0)),
    };
    TestApp {
        router: routes(state),
        products,
        tasks,
        queue,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app();
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_scrape_admits_batch() {
    let app = create_test_app();

    let (status, body) = send(
        &app.router,
        post_json(
            "/v1/scrape",
            json!({
                "items": [
                    { "asin": "b0test1234" },
                    { "asin": "B0TEST5678", "marketplace": "Amazon.co.jp" }
                ]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    let tasks = body["tasks"].as_array().unwrap();
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0]["asin"], "B0TEST1234");
    assert_eq!(tasks[0]["marketplace"], "amazon.com");
    assert_eq!(tasks[0]["status"], "queued");
    assert_eq!(tasks[1]["marketplace"], "amazon.co.jp");
    assert_eq!(app.queue.len(), 2);

    let id = tasks[0]["id"].as_str().unwrap();
    let (status, task) = send(&app.router, get(&format!("/v1/tasks/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["id"], id);
}

#[tokio::test]
async fn test_create_scrape_rejects_invalid_asin() {
    let app = create_test_app();

    let (status, body) = send(
        &app.router,
        post_json("/v1/scrape", json!({ "items": [{ "asin": "short" }] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
    assert!(app.queue.is_empty());

    let (status, _) = send(&app.router, post_json("/v1/scrape", json!({ "items": [] }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_task_returns_404() {
    let app = create_test_app();
    let (status, _) = send(
        &app.router,
        get(&format!("/v1/tasks/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_missing_product_enqueues_and_returns_202() {
    let app = create_test_app();

    let (status, body) = send(&app.router, get("/v1/products/B0TEST1234")).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["asin"], "B0TEST1234");
    assert_eq!(body["status"], "queued");
    assert!(body["task_id"].is_string());
    assert_eq!(app.queue.len(), 1);
}

#[tokio::test]
async fn test_get_fresh_product_returns_record_without_enqueue() {
    let app = create_test_app();
    let key = ItemKey::new("B0TEST1234", "amazon.com");
    let snapshot = plain_snapshot("Kettle");
    let record = ProductRecord::from_snapshot(&key, &snapshot, &structural_digest(&snapshot));
    app.products
        .insert_with_derived(&record, &snapshot.derived_collections())
        .await
        .unwrap();

    let (status, body) = send(&app.router, get("/v1/products/B0TEST1234")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Kettle");
    assert_eq!(body["refreshing"], false);
    assert_eq!(body["bullets"].as_array().unwrap().len(), 1);
    assert!(app.queue.is_empty());

    // 强制刷新时返回旧记录并在后台排队
    let (status, body) = send(&app.router, get("/v1/products/B0TEST1234?force=true")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshing"], true);
    assert_eq!(app.queue.len(), 1);
}

#[tokio::test]
async fn test_closed_queue_returns_503() {
    let app = create_test_app();
    app.queue.close().await;

    let (status, _) = send(&app.router, get("/v1/products/B0TEST1234")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_rejected_batch_marks_task_failed() {
    let app = create_test_app();
    app.queue.close().await;

    let (status, _) = send(
        &app.router,
        post_json(
            "/v1/scrape",
            json!({"items": [{"asin": "B0TEST1234", "marketplace": "amazon.com"}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let stats = app.tasks.stats().await.unwrap();
    assert_eq!(stats.queued, 0);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_stats_reports_queue_and_sessions() {
    let app = create_test_app();
    send(&app.router, get("/v1/products/B0TEST1234")).await;

    let (status, body) = send(&app.router, get("/v1/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queue_size"], 1);
    assert_eq!(body["session_capacity"], 4);
    assert_eq!(body["sessions_open"], 0);
    assert_eq!(body["tasks"]["queued"], 1);
    assert_eq!(body["products"]["total"], 0);
}
