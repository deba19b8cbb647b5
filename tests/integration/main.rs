//! Integration tests for the demo web service.
//!
//! These run the router on a real TCP listener and talk to it over HTTP.
//! Span export is checked against an in-process mock Jaeger collector.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Router};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::{Tracer, TracerProvider};
use serde_json::Value;
use tokio::net::TcpListener;

use demo_web::api::{create_router, AppState, BuildInfo};
use demo_web::error::TelemetryError;
use demo_web::health::HealthReporter;
use demo_web::telemetry::{Telemetry, TraceSettings};

const TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

/// Serve a router on an ephemeral local port.
async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn app_state(tracer: Tracer) -> AppState {
    AppState::new(
        "integration-host",
        BuildInfo {
            branch: "dev".to_string(),
            hash: "dev".to_string(),
        },
        tracer,
        HealthReporter::new(),
    )
}

/// Tracer that records nothing.
fn noop_tracer() -> Tracer {
    TracerProvider::builder().build().tracer("integration")
}

fn telemetry(endpoint: String) -> Telemetry {
    Telemetry::new(TraceSettings {
        endpoint: Some(endpoint),
        service_name: "demo-web".to_string(),
        service_version: "1.0.0".to_string(),
    })
    .unwrap()
}

type Collected = Arc<Mutex<Vec<Bytes>>>;

async fn collect(State(store): State<Collected>, batch: Bytes) -> StatusCode {
    store.lock().unwrap().push(batch);
    StatusCode::ACCEPTED
}

async fn collect_slowly(State(store): State<Collected>, batch: Bytes) -> StatusCode {
    tokio::time::sleep(Duration::from_secs(2)).await;
    collect(State(store), batch).await
}

/// Mock Jaeger collector that records every Thrift batch it receives.
async fn spawn_collector() -> (String, Collected) {
    let store: Collected = Arc::default();
    let router = Router::new()
        .route("/api/traces", post(collect))
        .with_state(store.clone());
    let addr = spawn_server(router).await;
    (format!("http://{addr}/api/traces"), store)
}

/// Collector that answers well after any reasonable flush deadline.
async fn spawn_slow_collector() -> String {
    let router = Router::new()
        .route("/api/traces", post(collect_slowly))
        .with_state(Collected::default());
    let addr = spawn_server(router).await;
    format!("http://{addr}/api/traces")
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle.as_bytes())
}

#[tokio::test]
async fn echo_over_tcp() {
    let addr = spawn_server(create_router(app_state(noop_tracer()))).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/foo/bar"))
        .header("X-Test", "1")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["uri"], "/foo/bar");
    assert_eq!(body["headers"]["X-Test"], serde_json::json!(["1"]));
    assert_eq!(body["hostname"], "integration-host");
}

#[tokio::test]
async fn health_is_not_shadowed_by_echo() {
    let addr = spawn_server(create_router(app_state(noop_tracer()))).await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["healthy"], true);
    assert!(body.get("uri").is_none());
}

#[tokio::test]
async fn random_result_over_tcp() {
    let addr = spawn_server(create_router(app_state(noop_tracer()))).await;
    let client = reqwest::Client::new();

    let ok = client
        .get(format!("http://{addr}/randomResult?chance=0"))
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), reqwest::StatusCode::OK);

    let failed = client
        .get(format!("http://{addr}/randomResult?chance=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(failed.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);

    let invalid = client
        .get(format!("http://{addr}/randomResult?chance=abc"))
        .send()
        .await
        .unwrap();
    assert_eq!(invalid.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn spans_reach_collector_on_shutdown() {
    let (endpoint, collected) = spawn_collector().await;
    let telemetry = telemetry(endpoint);

    let addr = spawn_server(create_router(app_state(telemetry.tracer()))).await;

    let response = reqwest::Client::new()
        .get(format!("http://{addr}/traced"))
        .header("traceparent", TRACEPARENT)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    telemetry.shutdown(Duration::from_secs(5)).await.unwrap();

    let batches = collected.lock().unwrap().clone();
    assert!(!batches.is_empty(), "collector received nothing");
    let batch = batches.concat();

    // Thrift binary carries strings verbatim.
    assert!(contains(&batch, "demo-web"));
    assert!(contains(&batch, "/*path"));
    assert!(contains(&batch, "echo"));
    assert!(contains(&batch, "/traced"));
}

#[tokio::test]
async fn failed_export_does_not_block_shutdown() {
    // Nothing listens on the collector path, so every batch is rejected.
    let addr = spawn_server(Router::new()).await;
    let telemetry = telemetry(format!("http://{addr}/api/traces"));

    let app = spawn_server(create_router(app_state(telemetry.tracer()))).await;
    reqwest::get(format!("http://{app}/health")).await.unwrap();

    telemetry.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn slow_collector_exceeds_shutdown_timeout() {
    let telemetry = telemetry(spawn_slow_collector().await);

    let app = spawn_server(create_router(app_state(telemetry.tracer()))).await;
    reqwest::get(format!("http://{app}/health")).await.unwrap();

    let err = telemetry
        .shutdown(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, TelemetryError::ShutdownTimeout(t) if t == Duration::from_millis(50)));
}

#[tokio::test]
async fn collector_endpoint_must_be_http() {
    let err = Telemetry::new(TraceSettings {
        endpoint: Some("ftp://localhost/api/traces".to_string()),
        service_name: "demo-web".to_string(),
        service_version: "1.0.0".to_string(),
    })
    .err()
    .unwrap();
    assert!(matches!(err, TelemetryError::UnsupportedScheme(_)));
}
