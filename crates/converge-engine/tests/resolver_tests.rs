//! Integration tests for the diff resolver loop.
//!
//! A wiremock server stands in for the provider's diff handlers; each
//! test drives resolver ticks directly instead of running the timer loop.

mod common;

use common::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use converge_core::IntentWatcher;
use converge_engine::{backoff_seconds, DiffResolver, EntityStores, ResolverConfig};
use converge_storage::{IntentWatcherStore, WatchlistStore};

fn resolver(
    stores: &EntityStores,
    registry: std::sync::Arc<converge_engine::KindRegistry>,
) -> DiffResolver {
    DiffResolver::new(stores.clone(), registry, ResolverConfig::default()).unwrap()
}

#[tokio::test]
async fn test_tick_fires_callback_with_diff_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handler/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    let metadata = seed_entity(&stores, json!({"x": 5}), json!({"x": 1})).await;
    watch(&stores, &metadata).await;

    resolver(&stores, registry).resolve_tick().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["metadata"]["uuid"], json!(metadata.uuid.to_string()));
    assert_eq!(body["spec"], json!({"x": 5}));
    assert_eq!(body["status"], json!({"x": 1}));
    assert_eq!(body["input"][0]["spec-val"], json!([5]));
    assert_eq!(body["input"][0]["status-val"], json!([1]));

    let watchlist = stores.watchlist.get_watchlist().await.unwrap();
    let entry = watchlist.get(metadata.uuid).unwrap();
    let in_flight = entry.in_flight.as_ref().unwrap();
    assert_eq!(in_flight.intentful_signature.signature, "x");
    assert!(in_flight.handler_url.as_ref().unwrap().ends_with("/healthcheck"));
    assert!(entry.delay.is_some());
}

#[tokio::test]
async fn test_backoff_gates_the_next_invocation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handler/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    let metadata = seed_entity(&stores, json!({"x": 5}), json!({"x": 1})).await;
    watch(&stores, &metadata).await;

    let resolver = resolver(&stores, registry);
    resolver.resolve_tick().await;
    // The armed delay has not elapsed; the second tick must not re-invoke.
    resolver.resolve_tick().await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_handler_delay_response_is_honored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handler/x"))
        .respond_with(ResponseTemplate::new(200).set_body_string("30"))
        .mount(&server)
        .await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    let metadata = seed_entity(&stores, json!({"x": 5}), json!({"x": 1})).await;
    watch(&stores, &metadata).await;

    resolver(&stores, registry).resolve_tick().await;

    let watchlist = stores.watchlist.get_watchlist().await.unwrap();
    let entry = watchlist.get(metadata.uuid).unwrap();
    assert_eq!(entry.delay.as_ref().unwrap().delay_seconds, 30);
}

#[tokio::test]
async fn test_handler_failure_is_recorded_and_backed_off() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handler/x"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    let metadata = seed_entity(&stores, json!({"x": 5}), json!({"x": 1})).await;
    watch(&stores, &metadata).await;

    // A watcher holds the outstanding diff.
    let registered = registry.get(KIND).unwrap();
    let diffs = registered.differ.all_diffs(&json!({"x": 5}), &json!({"x": 1}));
    let watcher = IntentWatcher::new(metadata.entity_ref(), metadata.spec_version, diffs);
    stores.watchers.save_watcher(watcher.clone()).await.unwrap();

    resolver(&stores, registry).resolve_tick().await;

    let updated = stores.watchers.get_watcher(watcher.uuid).await.unwrap();
    assert_eq!(updated.times_failed, 1);
    assert!(updated
        .last_handler_error
        .as_ref()
        .unwrap()
        .contains("500"));

    // The failed invocation arms the backoff schedule.
    let watchlist = stores.watchlist.get_watchlist().await.unwrap();
    let entry = watchlist.get(metadata.uuid).unwrap();
    assert_eq!(
        entry.delay.as_ref().unwrap().delay_seconds,
        backoff_seconds(1)
    );
}

#[tokio::test]
async fn test_converged_entity_is_dropped_without_invocation() {
    let server = MockServer::start().await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    let metadata = seed_entity(&stores, json!({"x": 5}), json!({"x": 5})).await;
    watch(&stores, &metadata).await;

    resolver(&stores, registry).resolve_tick().await;

    assert!(server.received_requests().await.unwrap().is_empty());
    assert!(stores.watchlist.get_watchlist().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_vanished_entity_entry_is_dropped() {
    let server = MockServer::start().await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    // Registered in the watchlist but never written to the spec store.
    let metadata = converge_core::Metadata::new(KIND, "infra", "v1");
    watch(&stores, &metadata).await;

    resolver(&stores, registry).resolve_tick().await;

    assert!(stores.watchlist.get_watchlist().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_per_entry_failures_are_isolated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handler/x"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);

    // One vanished entity and one healthy one; the healthy one must still
    // be processed.
    let missing = converge_core::Metadata::new(KIND, "infra", "v1");
    watch(&stores, &missing).await;
    let healthy = seed_entity(&stores, json!({"x": 5}), json!({"x": 1})).await;
    watch(&stores, &healthy).await;

    resolver(&stores, registry).resolve_tick().await;

    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    let watchlist = stores.watchlist.get_watchlist().await.unwrap();
    assert!(watchlist.get(healthy.uuid).is_some());
    assert!(watchlist.get(missing.uuid).is_none());
}

#[tokio::test]
async fn test_top_up_samples_differ_entities() {
    let server = MockServer::start().await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    for i in 0..3 {
        seed_entity(&stores, json!({"x": i}), json!({"x": i})).await;
    }
    assert!(stores.watchlist.get_watchlist().await.unwrap().is_empty());

    resolver(&stores, registry).top_up_tick().await;

    assert_eq!(stores.watchlist.get_watchlist().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_dead_handler_probe_marks_watcher() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/handler/x"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    // The liveness probe fails while the diff handler is supposedly active.
    Mock::given(method("GET"))
        .and(path("/healthcheck"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let stores = EntityStores::in_memory();
    let registry = registry_for(&server.uri(), &["x"]);
    let metadata = seed_entity(&stores, json!({"x": 5}), json!({"x": 1})).await;
    watch(&stores, &metadata).await;

    let registered = registry.get(KIND).unwrap();
    let diffs = registered.differ.all_diffs(&json!({"x": 5}), &json!({"x": 1}));
    let watcher = IntentWatcher::new(metadata.entity_ref(), metadata.spec_version, diffs);
    stores.watchers.save_watcher(watcher.clone()).await.unwrap();

    let config = ResolverConfig {
        // Elapse the retry delay immediately so the second tick retries.
        default_delay_secs: 0,
        ..ResolverConfig::default()
    };
    let resolver = DiffResolver::new(stores.clone(), registry, config).unwrap();
    resolver.resolve_tick().await;
    resolver.resolve_tick().await;

    let updated = stores.watchers.get_watcher(watcher.uuid).await.unwrap();
    assert!(updated.times_failed >= 1);
    assert!(updated
        .last_handler_error
        .as_ref()
        .unwrap()
        .contains("503"));
}
