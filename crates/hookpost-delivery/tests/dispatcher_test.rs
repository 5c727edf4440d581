//! Integration tests for the claim-and-dispatch transaction.
//!
//! Run against the in-memory mock store and a wiremock HTTP endpoint, with
//! a test clock driving `scheduled_at` eligibility deterministically.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use hookpost_core::{
    models::{Delivery, DeliveryStatus, Webhook},
    Clock, DeliveryId, TestClock, WebhookId,
};
use hookpost_delivery::{
    storage::mock::MockDispatchStorage, DeliveryExecutor, Dispatcher, ExecutorConfig,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn test_webhook(url: String, now: DateTime<Utc>) -> Webhook {
    Webhook {
        id: WebhookId::new(),
        name: "dispatch-test".to_string(),
        url,
        content_type: "application/json".to_string(),
        valid_status_codes: vec![200],
        secret_token: None,
        active: true,
        max_delivery_attempts: 3,
        delivery_attempt_timeout: 5,
        retry_min_backoff: 1,
        retry_max_backoff: 100,
        created_at: now,
        updated_at: now,
    }
}

fn pending_delivery(webhook: &Webhook, now: DateTime<Utc>) -> Delivery {
    Delivery {
        id: DeliveryId::new(),
        webhook_id: webhook.id,
        payload: r#"{"event":"order.created"}"#.to_string(),
        scheduled_at: now,
        delivery_attempts: 0,
        status: DeliveryStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

fn dispatcher(storage: &MockDispatchStorage, clock: &TestClock) -> Dispatcher {
    let executor =
        DeliveryExecutor::new(ExecutorConfig::default(), Arc::new(clock.clone())).unwrap();
    Dispatcher::new(Arc::new(storage.clone()), executor, Arc::new(clock.clone()))
}

#[tokio::test]
async fn success_path_terminates_delivery() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    let delivery = pending_delivery(&webhook, now);
    let delivery_id = delivery.id;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    let attempt = dispatcher(&storage, &clock).dispatch_one().await.unwrap().unwrap();

    assert!(attempt.success);
    assert_eq!(attempt.response_status_code, Some(200));
    assert!(attempt.error.is_none());
    assert_eq!(attempt.delivery_id, delivery_id);

    let stored = storage.delivery(delivery_id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Succeeded);
    assert_eq!(stored.delivery_attempts, 1);
    assert_eq!(storage.recorded_attempts().len(), 1);
}

#[tokio::test]
async fn empty_queue_is_not_an_error() {
    let clock = TestClock::new();
    let storage = MockDispatchStorage::new();

    let result = dispatcher(&storage, &clock).dispatch_one().await.unwrap();

    assert!(result.is_none());
    assert!(storage.recorded_attempts().is_empty());
}

#[tokio::test]
async fn concurrent_dispatchers_claim_exclusively() {
    let server = MockServer::start().await;
    // Slow response keeps the first claimant's row lock held while the
    // second dispatcher polls.
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    let delivery = pending_delivery(&webhook, now);
    let delivery_id = delivery.id;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    let first = dispatcher(&storage, &clock);
    let second = dispatcher(&storage, &clock);

    let (a, b) = tokio::join!(first.dispatch_one(), second.dispatch_one());
    let (a, b) = (a.unwrap(), b.unwrap());

    // Exactly one claimant wins; the loser sees an empty queue.
    assert!(a.is_some() != b.is_some(), "exactly one dispatcher must claim the delivery");
    assert_eq!(storage.recorded_attempts().len(), 1);
    assert_eq!(storage.delivery(delivery_id).unwrap().delivery_attempts, 1);
}

#[tokio::test]
async fn future_scheduled_at_is_respected() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    let mut delivery = pending_delivery(&webhook, now);
    delivery.scheduled_at = now + chrono::Duration::seconds(60);
    let delivery_id = delivery.id;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    let dispatcher = dispatcher(&storage, &clock);

    assert!(dispatcher.dispatch_one().await.unwrap().is_none());

    clock.advance(Duration::from_secs(61));
    assert!(dispatcher.dispatch_one().await.unwrap().is_some());
    assert_eq!(storage.delivery(delivery_id).unwrap().status, DeliveryStatus::Succeeded);
}

#[tokio::test]
async fn inactive_webhook_is_never_claimed() {
    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let mut webhook = test_webhook("http://127.0.0.1:1/unused".to_string(), now);
    webhook.active = false;
    let delivery = pending_delivery(&webhook, now);
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    assert!(dispatcher(&storage, &clock).dispatch_one().await.unwrap().is_none());
    assert!(storage.recorded_attempts().is_empty());
}

#[tokio::test]
async fn terminal_deliveries_are_never_reselected() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    let delivery = pending_delivery(&webhook, now);
    let delivery_id = delivery.id;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    let dispatcher = dispatcher(&storage, &clock);

    assert!(dispatcher.dispatch_one().await.unwrap().is_some());
    assert!(dispatcher.dispatch_one().await.unwrap().is_none());

    assert_eq!(storage.delivery(delivery_id).unwrap().delivery_attempts, 1);
    assert_eq!(storage.recorded_attempts().len(), 1);
}

#[tokio::test]
async fn failing_endpoint_exhausts_attempts_and_fails() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let mut webhook = test_webhook(server.uri(), now);
    webhook.max_delivery_attempts = 2;
    let delivery = pending_delivery(&webhook, now);
    let delivery_id = delivery.id;
    let scheduled_before = delivery.scheduled_at;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    let dispatcher = dispatcher(&storage, &clock);

    // First attempt: recoverable failure, rescheduled with backoff.
    assert!(dispatcher.dispatch_one().await.unwrap().is_some());
    let after_first = storage.delivery(delivery_id).unwrap();
    assert_eq!(after_first.status, DeliveryStatus::Pending);
    assert_eq!(after_first.delivery_attempts, 1);
    assert!(after_first.scheduled_at >= scheduled_before + chrono::Duration::seconds(1));

    // Not eligible again until the backoff elapses.
    assert!(dispatcher.dispatch_one().await.unwrap().is_none());

    clock.advance(Duration::from_secs(2));

    // Second attempt hits the cap and fails permanently.
    assert!(dispatcher.dispatch_one().await.unwrap().is_some());
    let after_second = storage.delivery(delivery_id).unwrap();
    assert_eq!(after_second.status, DeliveryStatus::Failed);
    assert_eq!(after_second.delivery_attempts, 2);

    let attempts = storage.recorded_attempts();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| !a.success));
    assert!(attempts.iter().all(|a| a.response_status_code == Some(500)));
}

#[tokio::test]
async fn transport_failure_still_records_attempt() {
    // Bind then drop the server so connections are refused.
    let server = MockServer::start().await;
    let url = server.uri();
    drop(server);

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(url, now);
    let delivery = pending_delivery(&webhook, now);
    let delivery_id = delivery.id;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);

    let attempt = dispatcher(&storage, &clock).dispatch_one().await.unwrap().unwrap();

    assert!(!attempt.success);
    assert!(attempt.error.is_some());
    assert!(attempt.response_status_code.is_none());
    assert!(attempt.raw_response.is_none());

    let stored = storage.delivery(delivery_id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Pending);
    assert_eq!(stored.delivery_attempts, 1);
}

#[tokio::test]
async fn claim_error_propagates_to_caller() {
    let clock = TestClock::new();
    let storage = MockDispatchStorage::new();
    storage.inject_claim_error("connection reset by peer");

    let result = dispatcher(&storage, &clock).dispatch_one().await;

    assert!(result.is_err());
}

#[tokio::test]
async fn commit_failure_persists_nothing_and_releases_claim() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let clock = TestClock::new();
    let now = clock.now_utc();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    let delivery = pending_delivery(&webhook, now);
    let delivery_id = delivery.id;
    storage.add_webhook(webhook);
    storage.add_delivery(delivery);
    storage.inject_commit_error("commit failed: connection lost");

    let dispatcher = dispatcher(&storage, &clock);

    assert!(dispatcher.dispatch_one().await.is_err());

    // Nothing was persisted and the claim lock is gone.
    let stored = storage.delivery(delivery_id).unwrap();
    assert_eq!(stored.status, DeliveryStatus::Pending);
    assert_eq!(stored.delivery_attempts, 0);
    assert!(storage.recorded_attempts().is_empty());

    // The next poll can claim and finish the delivery.
    assert!(dispatcher.dispatch_one().await.unwrap().is_some());
    assert_eq!(storage.delivery(delivery_id).unwrap().status, DeliveryStatus::Succeeded);
}
