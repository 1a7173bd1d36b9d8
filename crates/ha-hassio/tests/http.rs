//! Push endpoint tests

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{announcement, hassio_entry, MockEntries, MockSupervisor, RecordingFlows};
use ha_hassio::{create_router, HassIODiscovery};
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

struct Fixture {
    supervisor: Arc<MockSupervisor>,
    flows: Arc<RecordingFlows>,
    entries: Arc<MockEntries>,
    app: Router,
}

fn fixture() -> Fixture {
    let supervisor = Arc::new(MockSupervisor::default());
    supervisor.install_addon("core_mosquitto", "Mosquitto broker");
    let flows = Arc::new(RecordingFlows::default());
    let entries = Arc::new(MockEntries::with_entries(vec![hassio_entry("mqtt", "abc123")]));

    let discovery = Arc::new(HassIODiscovery::new(
        supervisor.clone(),
        flows.clone(),
        entries.clone(),
    ));

    Fixture {
        supervisor,
        flows,
        entries,
        app: create_router(discovery),
    }
}

fn delete_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_post_fetches_announcement() {
    let fixture = fixture();
    fixture
        .supervisor
        .announce(announcement("mqtt", "core_mosquitto", "abc123"));

    let response = fixture
        .app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/hassio_push/discovery/abc123")
                .body(Body::from(r#"{"service": "forged"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let calls = fixture.flows.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].handler, "mqtt");
    assert_eq!(calls[0].payload["config"]["addon"], "Mosquitto broker");
}

#[tokio::test]
async fn test_post_unknown_uuid() {
    let fixture = fixture();

    let response = fixture
        .app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/hassio_push/discovery/abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(fixture.flows.calls().is_empty());
    assert_eq!(fixture.supervisor.lookups(), vec!["abc123".to_string()]);
}

#[tokio::test]
async fn test_post_without_addon_info() {
    let fixture = fixture();
    fixture
        .supervisor
        .announce(announcement("hue", "core_hue", "def456"));

    let response = fixture
        .app
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/hassio_push/discovery/def456")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(fixture.flows.calls().is_empty());
}

#[tokio::test]
async fn test_delete_while_announced() {
    let fixture = fixture();
    fixture
        .supervisor
        .announce(announcement("mqtt", "core_mosquitto", "abc123"));

    let response = fixture
        .app
        .oneshot(delete_request(
            "/api/hassio_push/discovery/abc123",
            json!({"service": "mqtt", "uuid": "abc123"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(fixture.entries.removed().is_empty());
    assert_eq!(fixture.entries.queries(), 0);
}

#[tokio::test]
async fn test_delete_after_purge() {
    let fixture = fixture();

    let response = fixture
        .app
        .oneshot(delete_request(
            "/api/hassio_push/discovery/abc123",
            json!({"service": "mqtt", "uuid": "abc123"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fixture.entries.removed().len(), 1);
    assert!(fixture.entries.remaining().is_empty());
}

#[tokio::test]
async fn test_delete_requires_body() {
    let fixture = fixture();

    let response = fixture
        .app
        .oneshot(delete_request(
            "/api/hassio_push/discovery/abc123",
            json!({"uuid": "abc123"}),
        ))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
    assert!(fixture.supervisor.lookups().is_empty());
    assert!(fixture.entries.removed().is_empty());
}
