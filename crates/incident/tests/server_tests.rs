//! Integration tests for the HTTP boundary.
//!
//! The router is served on a random port and exercised with reqwest.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use incident::server::{build_router, AppState};
use incident::Integrations;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::{config, FakeChat, FakeLookup};

/// Serve the router with fake integrations on a random port.
async fn start_server(chat: Arc<FakeChat>) -> SocketAddr {
    let config = Arc::new(config(&[("PAGERDUTY_INCIDENT_MANAGER_SERVICE_ID", "PSVC1")]));
    let integrations =
        Integrations::new(chat).with_alert_lookup(Arc::new(FakeLookup::with("PINC1", "C123")));
    let app = build_router(AppState::new(config, integrations));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;

    addr
}

#[tokio::test]
async fn test_invalid_token_is_unauthorized() {
    let chat = Arc::new(FakeChat::new("C123"));
    let addr = start_server(chat.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .form(&[("token", "wrong"), ("text", "DB down"), ("user_name", "alice")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(chat.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let addr = start_server(Arc::new(FakeChat::new("C123"))).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .form(&[("text", "DB down")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_empty_body_is_unauthorized() {
    let chat = Arc::new(FakeChat::new("C123"));
    let addr = start_server(chat.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(chat.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_json_body_is_unauthorized() {
    let chat = Arc::new(FakeChat::new("C123"));
    let addr = start_server(chat.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .json(&json!({ "token": "s3cret", "text": "DB down" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
    assert!(chat.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_is_method_not_allowed() {
    let addr = start_server(Arc::new(FakeChat::new("C123"))).await;

    let response = reqwest::get(format!("http://{addr}/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "METHOD_NOT_ALLOWED");
    assert_eq!(body["error"]["message"], "Only POST requests are accepted");
}

#[tokio::test]
async fn test_slash_command_opens_incident() {
    let chat = Arc::new(FakeChat::new("C123"));
    let addr = start_server(chat.clone()).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .form(&[
            ("token", "s3cret"),
            ("text", "DB down"),
            ("user_name", "alice"),
            ("user_id", "U1"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["incident_channel_id"], "C123");
    assert!(body["text"].as_str().unwrap().contains("DB down"));

    let created = chat.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("incident-"));
}

#[tokio::test]
async fn test_channel_failure_is_server_error() {
    let addr = start_server(Arc::new(FakeChat::failing_create())).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/"))
        .form(&[("token", "s3cret"), ("text", "DB down")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "CHANNEL_CREATION_FAILED");
}

#[tokio::test]
async fn test_pagerduty_webhook_always_ok() {
    let chat = Arc::new(FakeChat::new("C999"));
    let addr = start_server(chat.clone()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/pagerduty"))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({ "text": "OK" }));

    let response = client
        .post(format!("http://{addr}/pagerduty"))
        .json(&json!({
            "messages": [{
                "event": "incident.acknowledge",
                "incident": { "id": "PINC1", "service": { "id": "PSVC1" } },
                "log_entries": [{ "agent": { "summary": "Bob" } }]
            }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(chat.posts_containing("C123", "Bob acknowledged").len(), 1);
}

#[tokio::test]
async fn test_health_check() {
    let addr = start_server(Arc::new(FakeChat::new("C123"))).await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body, json!({ "status": "healthy" }));
}
