//! Control-plane route tests over in-memory collaborators.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use messaging_api::{create_router, AppState};
use messaging_core::MessageStore;
use messaging_dispatch::{Scheduler, TickFn};
use messaging_testing::{FailingStore, MemoryStore};
use tower::util::ServiceExt;

fn idle_scheduler() -> Arc<Scheduler> {
    let tick: TickFn = Arc::new(|_| Box::pin(async {}));
    Arc::new(Scheduler::new(Duration::from_secs(300), tick).expect("scheduler should build"))
}

fn app_with_store(store: Arc<dyn MessageStore>) -> (axum::Router, Arc<Scheduler>) {
    let scheduler = idle_scheduler();
    (create_router(AppState::new(scheduler.clone(), store)), scheduler)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.expect("body reads").to_bytes();
    serde_json::from_slice(&bytes).expect("body is JSON")
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.expect("body reads").to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn health_reports_ok() {
    let (app, _scheduler) = app_with_store(Arc::new(MemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn index_serves_the_service_name() {
    let (app, _scheduler) = app_with_store(Arc::new(MemoryStore::new()));

    let response =
        app.oneshot(Request::builder().uri("/").body(Body::empty()).unwrap()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "automatic-messaging");
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let (app, _scheduler) = app_with_store(Arc::new(MemoryStore::new()));

    let response = app
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.headers().contains_key("X-Request-Id"));
}

#[tokio::test]
async fn lifecycle_endpoints_report_the_post_action_flag() {
    let (app, scheduler) = app_with_store(Arc::new(MemoryStore::new()));

    let status = app
        .clone()
        .oneshot(Request::builder().uri("/v1/scheduler/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(status).await, serde_json::json!({ "running": false }));

    let start = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/scheduler/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(start.status(), StatusCode::OK);
    assert_eq!(body_json(start).await, serde_json::json!({ "running": true }));

    // Starting again is not an error and still reports running.
    let restart = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/scheduler/start")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(restart.status(), StatusCode::OK);
    assert_eq!(body_json(restart).await, serde_json::json!({ "running": true }));

    let stop = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/scheduler/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stop.status(), StatusCode::OK);
    assert_eq!(body_json(stop).await, serde_json::json!({ "running": false }));

    assert!(!scheduler.is_running());
}

#[tokio::test]
async fn list_sent_returns_items_newest_first() {
    let store = Arc::new(MemoryStore::new());
    for n in 0..3 {
        let id = store.seed("+3611", format!("m{n}"));
        store.claim_pending(1).await.unwrap();
        store.mark_sent(id, format!("r-{n}")).await.unwrap();
    }

    let (app, _scheduler) = app_with_store(store);
    let response = app
        .oneshot(Request::builder().uri("/v1/messages/sent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let items = body["items"].as_array().expect("items array");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["status"], "sent");
    assert!(items[0]["remote_message_id"].is_string());
}

#[tokio::test]
async fn unparsable_paging_params_fall_back_to_defaults() {
    let store = Arc::new(MemoryStore::new());
    let id = store.seed("+3611", "hello");
    store.claim_pending(1).await.unwrap();
    store.mark_sent(id, "r-1".to_string()).await.unwrap();

    let (app, _scheduler) = app_with_store(store);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/messages/sent?limit=banana&offset=%20")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn store_errors_surface_as_plain_text_500() {
    let (app, _scheduler) = app_with_store(Arc::new(FailingStore::new("pool exhausted")));

    let response = app
        .oneshot(Request::builder().uri("/v1/messages/sent").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = body_text(response).await;
    assert!(text.contains("pool exhausted"), "body: {text}");
}
