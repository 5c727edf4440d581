//! Integration tests for the dispatch worker loop.
//!
//! The worker runs against the mock store with real (short) polling
//! intervals; assertions poll with a bounded deadline to stay robust on
//! slow machines.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use hookpost_core::{
    models::{Delivery, DeliveryStatus, Webhook},
    DeliveryId, RealClock, WebhookId,
};
use hookpost_delivery::{
    storage::mock::MockDispatchStorage, DeliveryExecutor, DispatchWorker, Dispatcher,
    ExecutorConfig, WorkerConfig,
};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

fn test_webhook(url: String, now: DateTime<Utc>) -> Webhook {
    Webhook {
        id: WebhookId::new(),
        name: "worker-test".to_string(),
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
        payload: "{}".to_string(),
        scheduled_at: now,
        delivery_attempts: 0,
        status: DeliveryStatus::Pending,
        created_at: now,
        updated_at: now,
    }
}

fn test_worker(storage: &MockDispatchStorage, poll_interval: Duration) -> Arc<DispatchWorker> {
    let clock = Arc::new(RealClock);
    let executor = DeliveryExecutor::new(ExecutorConfig::default(), clock.clone()).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(storage.clone()), executor, clock.clone()));
    Arc::new(DispatchWorker::new(
        dispatcher,
        WorkerConfig { poll_interval, shutdown_timeout: Duration::from_secs(5) },
        clock,
    ))
}

/// Polls until `condition` holds or the deadline expires.
async fn wait_for<F: Fn() -> bool>(condition: F, deadline: Duration) -> bool {
    let started = std::time::Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn worker_drains_backlog() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let now = Utc::now();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    for _ in 0..3 {
        storage.add_delivery(pending_delivery(&webhook, now));
    }
    storage.add_webhook(webhook);

    // A long poll interval proves the backlog drains without sleeping
    // between produced attempts.
    let worker = test_worker(&storage, Duration::from_secs(30));
    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    let drained = {
        let storage = storage.clone();
        wait_for(move || storage.recorded_attempts().len() == 3, Duration::from_secs(5)).await
    };
    assert!(drained, "worker should drain all three deliveries without idling");
    assert!(storage.recorded_attempts().iter().all(|a| a.success));

    worker.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker should stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn worker_treats_dispatch_errors_as_transient() {
    let server = MockServer::start().await;
    Mock::given(matchers::method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let now = Utc::now();
    let storage = MockDispatchStorage::new();
    let webhook = test_webhook(server.uri(), now);
    storage.add_delivery(pending_delivery(&webhook, now));
    storage.add_webhook(webhook);
    storage.inject_claim_error("simulated storage outage");

    let worker = test_worker(&storage, Duration::from_millis(20));
    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    // The first poll fails; the loop keeps running and delivers on a later
    // tick.
    let delivered = {
        let storage = storage.clone();
        wait_for(move || storage.recorded_attempts().len() == 1, Duration::from_secs(5)).await
    };
    assert!(delivered, "worker should recover from a transient dispatch error");

    worker.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("worker should stop after shutdown")
        .unwrap();
}

#[tokio::test]
async fn shutdown_interrupts_idle_sleep() {
    let storage = MockDispatchStorage::new();

    // Empty queue and a long poll interval: the worker parks in its idle
    // sleep almost immediately.
    let worker = test_worker(&storage, Duration::from_secs(60));
    let handle = tokio::spawn({
        let worker = worker.clone();
        async move { worker.run().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    let shutdown_started = std::time::Instant::now();
    worker.shutdown();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("shutdown must not wait out the poll interval")
        .unwrap();
    assert!(shutdown_started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn shutdown_before_run_exits_immediately() {
    let storage = MockDispatchStorage::new();
    let worker = test_worker(&storage, Duration::from_secs(60));

    worker.shutdown();

    // The stop flag is checked at the top of the loop, so run returns
    // without dispatching.
    tokio::time::timeout(Duration::from_secs(1), worker.run())
        .await
        .expect("run should observe the prior shutdown request");
}
