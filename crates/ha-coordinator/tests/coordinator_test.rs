//! Refresh, fan-out and lifecycle behavior of the coordinator

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::FakeClient;
use ha_coordinator::{Coordinator, CoordinatorConfig, SetupError, UpdateError};
use serde_json::json;

fn config(interval_secs: u64) -> CoordinatorConfig {
    CoordinatorConfig::new("front_door").with_update_interval(Duration::from_secs(interval_secs))
}

fn count_listener(coordinator: &Coordinator<FakeClient>) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    coordinator.add_listener(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    count
}

#[tokio::test(start_paused = true)]
async fn test_timer_refreshes_every_interval() {
    let client = FakeClient::new(json!({"locked": true}));
    let coordinator = Coordinator::setup(config(30), client.clone()).await.unwrap();
    let _count = count_listener(&coordinator);

    assert_eq!(client.calls(), 1);
    let snapshot = coordinator.last_snapshot().unwrap();
    assert_eq!(snapshot.payload(), Some(&json!({"locked": true})));
    assert!(coordinator.is_polling());

    client.set_default(json!({"locked": false}));
    let mut rx = coordinator.subscribe();
    rx.borrow_and_update();

    let started = tokio::time::Instant::now();
    rx.changed().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(client.calls(), 2);
    assert_eq!(
        coordinator.last_snapshot().unwrap().payload(),
        Some(&json!({"locked": false}))
    );

    coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_polling_only_while_listeners_registered() {
    let client = FakeClient::new(json!({}));
    let coordinator = Coordinator::setup(config(10), client.clone()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(client.calls(), 1);
    assert!(!coordinator.is_polling());

    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let id = coordinator.add_listener(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    assert!(coordinator.is_polling());
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(client.calls(), 4);
    assert_eq!(count.load(Ordering::SeqCst), 3);

    assert!(coordinator.remove_listener(id));
    assert!(!coordinator.is_polling());
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(client.calls(), 4);

    coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_refresh_restarts_interval() {
    let client = FakeClient::new(json!({}));
    let coordinator = Coordinator::setup(config(30), client.clone()).await.unwrap();
    let _count = count_listener(&coordinator);

    tokio::time::sleep(Duration::from_secs(29)).await;
    coordinator.request_refresh().await;
    assert_eq!(client.calls(), 2);

    // Next tick is a full interval after the manual refresh, not at 30s
    tokio::time::sleep(Duration::from_secs(29)).await;
    assert_eq!(client.calls(), 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(client.calls(), 3);

    coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_debounced_requests_collapse_into_one_trailing_refresh() {
    let client = FakeClient::new(json!({}));
    let coordinator = Coordinator::new(
        config(30).with_request_refresh_cooldown(Duration::from_secs(10)),
        client.clone(),
    );

    coordinator.request_debounced_refresh().await;
    assert_eq!(client.calls(), 1);

    coordinator.request_debounced_refresh().await;
    coordinator.request_debounced_refresh().await;
    assert_eq!(client.calls(), 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(client.calls(), 2);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(client.calls(), 2);

    coordinator.request_debounced_refresh().await;
    assert_eq!(client.calls(), 3);

    coordinator.teardown().await;
}

#[tokio::test]
async fn test_zero_interval_rejected_at_setup() {
    let client = FakeClient::new(json!({}));

    let err = match Coordinator::setup(config(0), client.clone()).await {
        Ok(_) => panic!("setup should reject a zero interval"),
        Err(err) => err,
    };
    assert!(matches!(err, SetupError::InvalidConfig { .. }));
    assert!(err.update_error().is_none());
    assert!(client.is_closed());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fetch() {
    let client = FakeClient::new(json!({"locked": true}));
    let coordinator = Coordinator::new(config(30), client.clone());
    let notified = count_listener(&coordinator);
    client.hold();

    let first = tokio::spawn({
        let c = coordinator.clone();
        async move { c.request_refresh().await }
    });
    client.wait_started().await;
    assert!(coordinator.in_flight());

    let second = tokio::spawn({
        let c = coordinator.clone();
        async move { c.request_refresh().await }
    });
    tokio::task::yield_now().await;

    client.release(1);
    let a = first.await.unwrap();
    let b = second.await.unwrap();

    assert_eq!(client.calls(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(!coordinator.in_flight());
}

#[tokio::test]
async fn test_refresh_completes_when_callers_are_dropped() {
    let client = FakeClient::new(json!({"locked": true}));
    let coordinator = Coordinator::new(config(30), client.clone());
    client.hold();

    let caller = tokio::spawn({
        let c = coordinator.clone();
        async move { c.request_refresh().await }
    });
    client.wait_started().await;
    caller.abort();
    let _ = caller.await;

    let notified = count_listener(&coordinator);
    client.release(1);
    let snapshot = coordinator.request_refresh().await;

    assert_eq!(client.calls(), 1);
    assert!(snapshot.is_success());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failure_then_recovery() {
    let client = FakeClient::new(json!({"locked": false}));
    let coordinator = Coordinator::new(config(30), client.clone());
    let notified = count_listener(&coordinator);

    client.push_response(Err(UpdateError::connection("connection reset")));
    let failed = coordinator.request_refresh().await;
    assert!(!coordinator.available());
    assert_eq!(coordinator.data(), None);
    assert!(failed.payload().is_none());
    assert_eq!(
        failed.error(),
        Some(&UpdateError::connection("connection reset"))
    );
    assert_eq!(notified.load(Ordering::SeqCst), 1);

    let recovered = coordinator.request_refresh().await;
    assert!(coordinator.available());
    assert_eq!(coordinator.data(), Some(json!({"locked": false})));
    assert_eq!(recovered.payload(), Some(&json!({"locked": false})));
    assert!(recovered.timestamp() >= failed.timestamp());
    assert_eq!(notified.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_listener_sees_whole_snapshot() {
    let client = FakeClient::new(json!({"n": 0}));
    let coordinator = Coordinator::new(config(30), client.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let c = coordinator.clone();
    let s = seen.clone();
    coordinator.add_listener(move || {
        let snapshot = c.last_snapshot().unwrap();
        // payload and error always come from the same fetch
        assert_ne!(snapshot.payload().is_some(), snapshot.error().is_some());
        s.lock().unwrap().push(snapshot.payload().cloned());
    });

    client.push_response(Ok(json!({"n": 1})));
    client.push_response(Err(UpdateError::Timeout));
    client.push_response(Ok(json!({"n": 3})));
    for _ in 0..3 {
        coordinator.request_refresh().await;
    }

    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some(json!({"n": 1})), None, Some(json!({"n": 3}))]
    );
    coordinator.teardown().await;
}

#[tokio::test]
async fn test_removed_listener_never_runs() {
    let client = FakeClient::new(json!({}));
    let coordinator = Coordinator::new(config(30), client.clone());
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let id = coordinator.add_listener(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    coordinator.request_refresh().await;
    assert!(coordinator.remove_listener(id));
    coordinator.request_refresh().await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.listener_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_setup_failure_starts_no_timer() {
    let client = FakeClient::new(json!({}));
    client.push_response(Err(UpdateError::connection("host unreachable")));

    let err = match Coordinator::setup(config(10), client.clone()).await {
        Ok(_) => panic!("setup should fail"),
        Err(err) => err,
    };
    assert!(matches!(err, SetupError::NotReady { .. }));
    assert_eq!(
        err.update_error(),
        Some(&UpdateError::connection("host unreachable"))
    );
    assert!(client.is_closed());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn test_setup_auth_failure_reported_distinctly() {
    let client = FakeClient::new(json!({}));
    client.push_response(Err(UpdateError::auth_failed("invalid api key")));

    let result = Coordinator::setup(config(10), client.clone()).await;
    assert!(matches!(result, Err(SetupError::AuthFailed { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_teardown_during_in_flight_refresh() {
    let client = FakeClient::new(json!({"locked": true}));
    let coordinator = Coordinator::setup(config(30), client.clone()).await.unwrap();
    let notified = count_listener(&coordinator);
    client.hold();

    let refresh = tokio::spawn({
        let c = coordinator.clone();
        async move { c.request_refresh().await }
    });
    client.wait_started().await;

    let teardown = tokio::spawn({
        let c = coordinator.clone();
        async move { c.teardown().await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(!teardown.is_finished());
    assert!(!client.is_closed());

    client.release(1);
    teardown.await.unwrap();
    let snapshot = refresh.await.unwrap();

    assert!(snapshot.is_success());
    assert_eq!(notified.load(Ordering::SeqCst), 1);
    assert!(client.is_closed());
    assert!(!coordinator.is_polling());
    assert_eq!(coordinator.listener_count(), 0);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(client.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_no_fetch_after_teardown_even_when_tick_due() {
    let client = FakeClient::new(json!({}));
    let coordinator = Coordinator::setup(config(30), client.clone()).await.unwrap();
    let _count = count_listener(&coordinator);

    // Let the clock reach the tick deadline without yielding to the timer
    tokio::time::advance(Duration::from_secs(30)).await;
    coordinator.teardown().await;
    let calls = client.calls();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(client.calls(), calls);

    coordinator.request_refresh().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(client.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_halts_polling_until_success() {
    let client = FakeClient::new(json!({"ok": true}));
    let coordinator = Coordinator::setup(config(30), client.clone()).await.unwrap();
    let _count = count_listener(&coordinator);

    client.push_response(Err(UpdateError::auth_failed("token expired")));
    let mut rx = coordinator.subscribe();
    rx.borrow_and_update();
    rx.changed().await.unwrap();
    assert_eq!(client.calls(), 2);
    assert!(!coordinator.last_update_success());
    assert!(!coordinator.is_polling());

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(client.calls(), 2);

    let snapshot = coordinator.request_refresh().await;
    assert!(snapshot.is_success());
    assert!(coordinator.is_polling());

    rx.borrow_and_update();
    rx.changed().await.unwrap();
    assert_eq!(client.calls(), 4);

    coordinator.teardown().await;
}

#[tokio::test(start_paused = true)]
async fn test_request_timeout() {
    let client = FakeClient::new(json!({}));
    client.hold();
    let coordinator = Coordinator::new(
        config(30).with_request_timeout(Duration::from_secs(5)),
        client.clone(),
    );

    let snapshot = coordinator.request_refresh().await;
    assert_eq!(snapshot.error(), Some(&UpdateError::Timeout));
    assert!(!coordinator.in_flight());
    assert_eq!(client.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_three_failures_keep_device_unavailable() {
    let client = FakeClient::new(json!({}));
    let coordinator = Coordinator::setup(config(10), client.clone()).await.unwrap();
    let _count = count_listener(&coordinator);
    for _ in 0..3 {
        client.push_response(Err(UpdateError::connection("no route to host")));
    }

    let mut rx = coordinator.subscribe();
    for expected in 1..=3 {
        rx.borrow_and_update();
        rx.changed().await.unwrap();
        assert_eq!(coordinator.consecutive_failures(), expected);
        assert!(coordinator.last_error().is_some());
    }

    // Failures never stop transient polling
    rx.borrow_and_update();
    rx.changed().await.unwrap();
    assert!(coordinator.last_update_success());
    assert!(coordinator.is_polling());

    coordinator.teardown().await;
}

#[tokio::test]
async fn test_joined_refresh_waits_for_the_same_fetch() {
    use tokio_test::{assert_pending, task};

    let client = FakeClient::new(json!({"locked": true}));
    let coordinator = Coordinator::new(config(30), client.clone());
    client.hold();

    let mut first = task::spawn(coordinator.request_refresh());
    let mut second = task::spawn(coordinator.request_refresh());
    assert_pending!(first.poll());
    assert_pending!(second.poll());

    client.wait_started().await;
    assert!(coordinator.in_flight());
    assert_pending!(second.poll());

    client.release(1);
    let (a, b) = tokio::join!(first, second);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(client.calls(), 1);
}
