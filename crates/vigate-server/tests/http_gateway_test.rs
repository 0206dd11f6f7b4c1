//! HTTP Gateway Integration Tests
//!
//! Drives a real `DispatchServer` over TCP with `reqwest`.
//!
//! Test Scenarios:
//! 1. Cold start: first request loads the component and returns the result
//! 2. Routing: unmatched paths, non-GET methods, unregistered routes
//! 3. Parameter binding: unknown keys, application error passthrough
//! 4. Single-flight loading under concurrent first requests
//! 5. Serialization of one method versus parallelism across methods
//! 6. Port fallback and lifecycle

mod support;

use futures::future::join_all;
use reqwest::StatusCode;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};
use support::{create_test_component, get, TestGateway, GREETER};
use vigate_common::ServerConfig;

// ============================================================================
// Cold start and routing
// ============================================================================

#[tokio::test]
async fn test_cold_start_greet() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    assert_eq!(gateway.engine.loads(), 0);

    let response = get(&gateway.url("hello?Who=World")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/plain");
    assert_eq!(response.headers()["cache-control"], "no-cache");
    assert_eq!(response.text().await.unwrap(), "Hello, World!");
    assert_eq!(gateway.engine.loads(), 1);
}

#[tokio::test]
async fn test_prefix_route_accepts_longer_paths() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    let response = get(&gateway.url("hello/extra?who=there")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "Hello, there!");
}

#[tokio::test]
async fn test_encoded_values_are_decoded() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    let response = get(&gateway.url("hello?Who=New%20York")).await;
    assert_eq!(response.text().await.unwrap(), "Hello, New York!");
}

#[tokio::test]
async fn test_unmatched_path_is_not_found() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    let response = get(&gateway.url("goodbye")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(gateway.engine.loads(), 0);
}

#[tokio::test]
async fn test_post_is_method_not_allowed() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    let response = reqwest::Client::new()
        .post(gateway.url("hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// ============================================================================
// Parameter binding and errors
// ============================================================================

#[tokio::test]
async fn test_unknown_parameter_is_bad_request() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    let response = get(&gateway.url("hello?Whom=World")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.text().await.unwrap().is_empty());

    // The rejected request left the default in place.
    let response = get(&gateway.url("hello")).await;
    assert_eq!(response.text().await.unwrap(), "Hello, nobody!");
}

#[tokio::test]
async fn test_application_error_status_passthrough() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");

    let response = get(&gateway.url("hello?Who=teapot")).await;
    assert_eq!(response.status().as_u16(), 418);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_numeric_parameters_are_coerced() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Add", "add");

    let response = get(&gateway.url("add?a=2&b=3")).await;
    assert_eq!(response.text().await.unwrap(), "2+3");

    let response = get(&gateway.url("add?a=two")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_missing_method_is_service_unavailable() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Missing", "missing");

    let response = get(&gateway.url("missing")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Loading and concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_requests_load_once() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");
    gateway.expose(component.path(), "Add", "add");

    let requests = (0..10).map(|i| {
        let url = if i % 2 == 0 {
            gateway.url("hello?Who=x")
        } else {
            gateway.url("add?A=1")
        };
        async move { get(&url).await.status() }
    });

    let statuses = join_all(requests).await;
    assert!(statuses.iter().all(|s| *s == StatusCode::OK));
    assert_eq!(gateway.engine.loads(), 1);
    assert_eq!(gateway.loader.loaded_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_method_runs_are_serialized() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "SlowA", "slow");

    // Warm up so loading time is not measured.
    assert_eq!(get(&gateway.url("slow")).await.status(), StatusCode::OK);

    let started = Instant::now();
    let requests = (0..3).map(|i| {
        let url = gateway.url(&format!("slow?Tag={}", i));
        async move {
            let response = get(&url).await;
            (response.status(), response.text().await.unwrap())
        }
    });
    let results = join_all(requests).await;
    let elapsed = started.elapsed();

    // Overlapping runs would be rejected by the engine with 503.
    for (i, (status, body)) in results.iter().enumerate() {
        assert_eq!(*status, StatusCode::OK);
        assert_eq!(*body, format!("a{}", i));
    }
    assert!(elapsed >= Duration::from_millis(900), "took {:?}", elapsed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_methods_run_in_parallel() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "SlowA", "a");
    gateway.expose(component.path(), "SlowB", "b");

    get(&gateway.url("a")).await;
    get(&gateway.url("b")).await;

    let url_a = gateway.url("a?Tag=1");
    let url_b = gateway.url("b?Tag=2");
    let started = Instant::now();
    let (a, b) = tokio::join!(get(&url_a), get(&url_b));
    let elapsed = started.elapsed();

    assert_eq!(a.text().await.unwrap(), "a1");
    assert_eq!(b.text().await.unwrap(), "b2");
    assert!(elapsed < Duration::from_millis(550), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_run_timeout_is_service_unavailable() {
    let component = create_test_component(GREETER);
    let gateway =
        TestGateway::with_config(ServerConfig::new().with_run_timeout(Duration::from_millis(50)));
    gateway.expose(component.path(), "SlowA", "slow");

    let response = get(&gateway.url("slow")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // The first run is still going, so this one is refused without starting.
    let response = get(&gateway.url("slow?Tag=1")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // After the parked run finishes its result is visible to the next request,
    // which then starts and times out on its own.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let response = get(&gateway.url("slow?Tag=2")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ============================================================================
// Port fallback and lifecycle
// ============================================================================

#[tokio::test]
async fn test_occupied_fixed_port_falls_back() {
    let occupied = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let taken = occupied.local_addr().unwrap().port();

    let component = create_test_component(GREETER);
    let gateway = TestGateway::with_config(ServerConfig::new().with_fixed_port(taken));
    gateway.expose(component.path(), "Greet", "hello");

    assert_ne!(gateway.addr().port(), taken);
    let response = get(&gateway.url("hello?Who=fallback")).await;
    assert_eq!(response.text().await.unwrap(), "Hello, fallback!");
}

#[tokio::test]
async fn test_unregistered_route_is_not_found() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    let endpoint = gateway.expose(component.path(), "Greet", "hello");

    assert_eq!(get(&gateway.url("hello")).await.status(), StatusCode::OK);
    assert!(endpoint.unregister(&gateway.server));
    assert_eq!(get(&gateway.url("hello")).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stop_closes_listener() {
    let component = create_test_component(GREETER);
    let gateway = TestGateway::new();
    gateway.expose(component.path(), "Greet", "hello");
    let url = gateway.url("hello");

    gateway.server.stop();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(reqwest::get(&url).await.is_err());
}
