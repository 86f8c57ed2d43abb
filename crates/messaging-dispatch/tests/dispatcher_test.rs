//! Dispatcher tests over the in-memory store and a stub webhook.

use std::{sync::Arc, time::Duration};

use messaging_core::{Clock, MessageStatus, MessageStore};
use messaging_dispatch::{
    BatchStats, Dispatcher, Outcomes, StoreOutcomes, WebhookClient, WebhookConfig,
};
use messaging_testing::{MemoryStore, RecordingCache, TestClock};
use tokio_util::sync::CancellationToken;
use wiremock::{matchers, Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers `202 Accepted` with a remote id derived from the request's
/// phone number, mirroring the stub used in end-to-end scenarios.
struct EchoAccept;

impl Respond for EchoAccept {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: serde_json::Value =
            serde_json::from_slice(&request.body).expect("request body is JSON");
        let phone = body["phoneNumber"].as_str().unwrap_or_default();
        ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "message": "Accepted",
            "messageId": format!("r-{phone}"),
        }))
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    cache: Arc<RecordingCache>,
    dispatcher: Dispatcher,
}

fn harness(server: &MockServer, cache: RecordingCache, content_max: usize) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(cache);
    let clock = Arc::new(TestClock::new());

    let outcomes: Arc<dyn Outcomes> =
        Arc::new(StoreOutcomes::new(store.clone(), cache.clone(), clock));
    let client = WebhookClient::new(WebhookConfig::new(format!("{}/hook", server.uri())))
        .expect("client should build");

    Harness { store: store.clone(), cache, dispatcher: Dispatcher::new(client, outcomes, content_max) }
}

#[tokio::test]
async fn batch_is_sent_in_order_and_outcomes_recorded() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .and(matchers::path("/hook"))
        .respond_with(EchoAccept)
        .expect(2)
        .mount(&server)
        .await;

    let h = harness(&server, RecordingCache::new(), 160);
    let first = h.store.seed("+3611", "a");
    let second = h.store.seed("+3622", "b");
    let batch = h.store.claim_pending(10).await.unwrap();

    let stats = h.dispatcher.process_batch(batch, &CancellationToken::new()).await;
    assert_eq!(stats, BatchStats { sent: 2, failed: 0 });

    let sent = h.store.message(first);
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.remote_message_id.as_deref(), Some("r-+3611"));
    assert!(sent.sent_at.is_some());

    assert_eq!(h.store.message(second).remote_message_id.as_deref(), Some("r-+3622"));

    let calls = h.cache.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, first);
    assert_eq!(calls[1].id, second);
}

#[tokio::test]
async fn overlong_content_fails_without_a_webhook_call() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST")).respond_with(EchoAccept).expect(0).mount(&server).await;

    let h = harness(&server, RecordingCache::new(), 3);
    let id = h.store.seed("+36", "abcd");
    let batch = h.store.claim_pending(1).await.unwrap();

    let stats = h.dispatcher.process_batch(batch, &CancellationToken::new()).await;
    assert_eq!(stats, BatchStats { sent: 0, failed: 1 });

    let failed = h.store.message(id);
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.attempt_count, 1);
    let reason = failed.last_error.expect("failure reason recorded");
    assert!(reason.contains('3'), "reason should name the bound: {reason}");
}

#[tokio::test]
async fn content_length_is_counted_in_code_points() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST")).respond_with(EchoAccept).expect(1).mount(&server).await;

    // Three code points, six bytes; a byte-counting bound would reject it.
    let h = harness(&server, RecordingCache::new(), 3);
    let id = h.store.seed("+36", "áéí");
    let batch = h.store.claim_pending(1).await.unwrap();

    let stats = h.dispatcher.process_batch(batch, &CancellationToken::new()).await;
    assert_eq!(stats, BatchStats { sent: 1, failed: 0 });
    assert_eq!(h.store.message(id).status, MessageStatus::Sent);
}

#[tokio::test]
async fn remote_rejection_records_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("nope"))
        .mount(&server)
        .await;

    let h = harness(&server, RecordingCache::new(), 160);
    let id = h.store.seed("+3611", "hello");
    let batch = h.store.claim_pending(1).await.unwrap();

    let stats = h.dispatcher.process_batch(batch, &CancellationToken::new()).await;
    assert_eq!(stats, BatchStats { sent: 0, failed: 1 });

    let failed = h.store.message(id);
    assert_eq!(failed.status, MessageStatus::Failed);
    let reason = failed.last_error.expect("failure reason recorded");
    assert!(reason.contains("200"), "reason: {reason}");
    assert!(reason.contains("nope"), "reason: {reason}");
    assert!(!h.cache.contains(id));
}

#[tokio::test]
async fn missing_remote_id_records_failure() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(serde_json::json!({ "message": "Accepted" })),
        )
        .mount(&server)
        .await;

    let h = harness(&server, RecordingCache::new(), 160);
    let id = h.store.seed("+3611", "hello");
    let batch = h.store.claim_pending(1).await.unwrap();

    h.dispatcher.process_batch(batch, &CancellationToken::new()).await;

    let reason = h.store.message(id).last_error.expect("failure reason recorded");
    assert!(reason.contains("missing messageId"), "reason: {reason}");
}

#[tokio::test]
async fn one_failure_does_not_stop_the_batch() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST")).respond_with(EchoAccept).expect(1).mount(&server).await;

    // First message fails validation, second still goes out.
    let h = harness(&server, RecordingCache::new(), 3);
    let bad = h.store.seed("+361", "too-long");
    let good = h.store.seed("+362", "ok");
    let batch = h.store.claim_pending(10).await.unwrap();

    let stats = h.dispatcher.process_batch(batch, &CancellationToken::new()).await;
    assert_eq!(stats, BatchStats { sent: 1, failed: 1 });
    assert_eq!(h.store.message(bad).status, MessageStatus::Failed);
    assert_eq!(h.store.message(good).status, MessageStatus::Sent);
}

#[tokio::test]
async fn cache_failure_never_affects_the_database_outcome() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST")).respond_with(EchoAccept).mount(&server).await;

    let h = harness(&server, RecordingCache::failing(), 160);
    let id = h.store.seed("+3611", "hello");
    let batch = h.store.claim_pending(1).await.unwrap();

    let stats = h.dispatcher.process_batch(batch, &CancellationToken::new()).await;
    assert_eq!(stats, BatchStats { sent: 1, failed: 0 });
    assert_eq!(h.store.message(id).status, MessageStatus::Sent);
}

#[tokio::test]
async fn cancellation_mid_batch_leaves_the_rest_in_processing() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(serde_json::json!({ "messageId": "late" }))
                .set_delay(Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let h = harness(&server, RecordingCache::new(), 160);
    let first = h.store.seed("+3611", "a");
    let second = h.store.seed("+3622", "b");
    let batch = h.store.claim_pending(10).await.unwrap();

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let stats = h.dispatcher.process_batch(batch, &cancel).await;
    assert_eq!(stats, BatchStats { sent: 0, failed: 1 });

    // The in-flight message is recorded as failed with the cancellation
    // reason; the remaining one is stranded in processing.
    let failed = h.store.message(first);
    assert_eq!(failed.status, MessageStatus::Failed);
    let reason = failed.last_error.expect("failure reason recorded");
    assert!(reason.contains("cancelled"), "reason: {reason}");

    assert_eq!(h.store.message(second).status, MessageStatus::Processing);
}

#[tokio::test]
async fn record_sent_uses_the_injected_clock_for_cache_timestamps() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST")).respond_with(EchoAccept).mount(&server).await;

    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(RecordingCache::new());
    let clock = Arc::new(TestClock::new());
    clock.advance(Duration::from_secs(3600));
    let expected = clock.now_utc();

    let outcomes: Arc<dyn Outcomes> =
        Arc::new(StoreOutcomes::new(store.clone(), cache.clone(), clock));
    let client = WebhookClient::new(WebhookConfig::new(format!("{}/hook", server.uri())))
        .expect("client should build");
    let dispatcher = Dispatcher::new(client, outcomes, 160);

    let id = store.seed("+3611", "hello");
    let batch = store.claim_pending(1).await.unwrap();
    dispatcher.process_batch(batch, &CancellationToken::new()).await;

    let calls = cache.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, id);
    assert_eq!(calls[0].sent_at, expected);
}
