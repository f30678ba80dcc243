//! End-to-end tests of the client facade over the HTTP transport.

use serde_json::json;
use std::sync::Arc;
use truenas_api::models::{AppCreateRequest, SnapshotCreateRequest};
use truenas_api::{AppService, HttpTransportBuilder, SnapshotService, TrueNasClient};
use truenas_core::client::{ClientConfig, PollPolicy, RetryPolicy};
use truenas_core::ErrorCode;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

async fn mount(server: &MockServer, rpc_method: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/api/current"))
        .and(body_partial_json(json!({"method": rpc_method})))
        .respond_with(response)
        .mount(server)
        .await;
}

fn client(server: &MockServer) -> TrueNasClient {
    let transport = HttpTransportBuilder::new(format!("{}/api/current", server.uri()))
        .unwrap()
        .with_api_key("1-test")
        .with_retry_policy(RetryPolicy::no_retry())
        .build()
        .unwrap();
    let config = ClientConfig::new()
        .with_poll_policy(PollPolicy::fixed(std::time::Duration::from_millis(10)));
    TrueNasClient::with_config(Arc::new(transport), &config)
}

#[tokio::test]
async fn test_create_app_waits_for_job() {
    let server = MockServer::start().await;
    mount(&server, "app.create", rpc_result(json!(41))).await;
    mount(
        &server,
        "core.get_jobs",
        rpc_result(json!([{
            "id": 41,
            "method": "app.create",
            "state": "SUCCESS",
            "result": {"name": "web", "state": "DEPLOYING", "custom_app": true}
        }])),
    )
    .await;

    let app = client(&server)
        .create_app(AppCreateRequest::new("web", true).with_compose("services: {}\n"))
        .await
        .unwrap();
    assert_eq!(app.name, "web");
    assert_eq!(app.state, "DEPLOYING");
}

#[tokio::test]
async fn test_failed_job_surfaces_classified_error() {
    let server = MockServer::start().await;
    mount(&server, "app.start", rpc_result(json!(42))).await;
    mount(
        &server,
        "core.get_jobs",
        rpc_result(json!([{
            "id": 42,
            "state": "FAILED",
            "error": "[EFAULT] Failed 'up' action for 'web' app\nTraceback (most recent call last):\n  File \"app.py\"",
            "logs_excerpt": "Error response from daemon: pull access denied"
        }])),
    )
    .await;

    let err = client(&server).start_app("web").await.unwrap_err();
    let api = err.as_api().unwrap();
    assert_eq!(api.code, ErrorCode::Efault);
    assert_eq!(api.job_id, Some(42));
    assert!(!err.detail().contains("Traceback"));
    assert!(err.detail().contains("pull access denied"));
}

#[tokio::test]
async fn test_missing_app_is_none() {
    let server = MockServer::start().await;
    mount(&server, "app.query", rpc_result(json!([]))).await;

    let app = client(&server).get_app_with_config("ghost").await.unwrap();
    assert!(app.is_none());
}

#[tokio::test]
async fn test_snapshot_method_follows_server_version() {
    let server = MockServer::start().await;
    mount(&server, "system.version", rpc_result(json!("TrueNAS-24.10.2.4"))).await;
    mount(
        &server,
        "zfs.snapshot.create",
        rpc_result(json!({"id": "tank/data@nightly", "dataset": "tank/data", "snapshot_name": "nightly"})),
    )
    .await;

    let snapshot = client(&server)
        .create_snapshot(SnapshotCreateRequest {
            dataset: "tank/data".into(),
            name: "nightly".into(),
            recursive: false,
        })
        .await
        .unwrap();
    assert_eq!(snapshot.id, "tank/data@nightly");
    assert_eq!(snapshot.short_name(), "nightly");
}
