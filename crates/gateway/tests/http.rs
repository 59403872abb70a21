// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the gateway HTTP API.
//!
//! Uses `axum_test::TestServer` for the gateway itself and in-process axum
//! servers for the token endpoint and Weaviate.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use axum_test::TestServer;
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use weavegate::config::GatewayConfig;
use weavegate::state::GatewayState;
use weavegate::test_support::{spawn_mock_weaviate, MockWeaviate};
use weavegate::transport::build_router;
use weavegate::{assert_err_contains, build_credentials};
use weavegate_auth::{CredentialManager, ProjectId, RefreshPolicy, VERTEX_KEY_HEADER};

fn config(mock: &MockWeaviate, extra: &[&str]) -> GatewayConfig {
    let url = mock.url();
    let mut argv = vec!["weavegate", "--weaviate-url", url.as_str()];
    argv.extend_from_slice(extra);
    GatewayConfig::parse_from(argv)
}

fn static_credentials() -> anyhow::Result<Arc<CredentialManager>> {
    Ok(CredentialManager::with_static_token(
        "ya29.http-static-token".to_owned(),
        ProjectId::fixed(Some("wind-proj".into())),
        RefreshPolicy::default(),
    )?)
}

fn test_server(config: GatewayConfig, credentials: Arc<CredentialManager>) -> anyhow::Result<TestServer> {
    let state = Arc::new(GatewayState::new(config, credentials, CancellationToken::new()));
    TestServer::new(build_router(state))
}

/// Token endpoint answering every POST with a fresh token; counts calls.
async fn mock_token_server() -> anyhow::Result<(SocketAddr, Arc<AtomicU32>)> {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let app = Router::new().route(
        "/token",
        post(move |_body: String| {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                axum::Json(json!({
                    "access_token": format!("ya29.minted-{n}-abcdefghijklmnop"),
                    "expires_in": 3599,
                    "token_type": "Bearer"
                }))
            }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, calls))
}

fn fixture_key() -> anyhow::Result<Value> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../auth/tests/fixtures/service-account.json");
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

#[tokio::test]
async fn health_is_open_even_with_auth() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &["--auth-token", "gate"]), static_credentials()?)?;

    for path in ["/health", "/api/v1/health"] {
        let resp = server.get(path).await;
        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body, json!({ "status": "ok", "service": "weaviate-mcp-http" }));
    }
    Ok(())
}

#[tokio::test]
async fn tools_require_bearer_when_configured() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &["--auth-token", "gate"]), static_credentials()?)?;

    let resp = server.get("/api/v1/tools").await;
    resp.assert_status_unauthorized();
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let resp = server.get("/api/v1/tools").authorization_bearer("gate").await;
    resp.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn tool_list_omits_hidden_tools() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &[]), static_credentials()?)?;

    let body: Value = server.get("/api/v1/tools").await.json();
    let names: Vec<&str> =
        body["tools"].as_array().into_iter().flatten().filter_map(|t| t["name"].as_str()).collect();
    assert!(names.contains(&"hybrid_search"));
    assert!(!names.contains(&"keyword_search"));
    assert!(!names.contains(&"semantic_search"));
    assert!(!names.contains(&"diagnose_vertex"));
    Ok(())
}

#[tokio::test]
async fn hybrid_call_forwards_vertex_headers() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &["--weaviate-api-key", "wv-key"]), static_credentials()?)?;

    let resp = server
        .post("/api/v1/tools/hybrid_search")
        .json(&json!({ "collection": "WindBilance", "query": "rotor blade" }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["isError"], json!(false));
    assert_eq!(body["structuredContent"]["count"], json!(2));

    for req in mock.recorded().await {
        let vertex = req.headers.get(VERTEX_KEY_HEADER).and_then(|v| v.to_str().ok());
        assert_eq!(vertex, Some("ya29.http-static-token"), "{}", req.path);
    }
    Ok(())
}

#[tokio::test]
async fn hidden_tool_is_callable() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &[]), static_credentials()?)?;

    let body: Value = server
        .post("/api/v1/tools/keyword_search")
        .json(&json!({ "collection": "WindBilance", "query": "hub", "limit": 3 }))
        .await
        .json();
    assert_eq!(body["isError"], json!(false));
    let queries = mock.graphql_queries().await;
    assert!(queries[0].contains("bm25:"));
    assert!(queries[0].contains("limit: 3"));
    Ok(())
}

#[tokio::test]
async fn malformed_body_and_unknown_tool_are_error_results() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &[]), static_credentials()?)?;

    let resp = server.post("/api/v1/tools/get_schema").text("{not json").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["isError"], json!(true));

    let body: Value = server.post("/api/v1/tools/nope").await.json();
    assert_eq!(body["isError"], json!(true));
    assert_eq!(body["content"][0]["text"], "Unknown tool: nope");
    Ok(())
}

#[tokio::test]
async fn credential_status_hides_token() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let server = test_server(config(&mock, &[]), static_credentials()?)?;

    let resp = server.get("/api/v1/credentials/status").await;
    resp.assert_status_ok();
    let text = resp.text();
    assert!(!text.contains("ya29.http-static-token"));
    let body: Value = serde_json::from_str(&text)?;
    assert_eq!(body["token_prefix"], "ya29.htt...");
    assert_eq!(body["project_id"], "wind-proj");
    Ok(())
}

#[tokio::test]
async fn refresh_without_source_is_credential_unavailable() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let credentials = CredentialManager::without_source(ProjectId::fixed(None), RefreshPolicy::default());
    let server = test_server(config(&mock, &[]), credentials)?;

    let resp = server.post("/api/v1/credentials/refresh").await;
    resp.assert_status_service_unavailable();
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "CREDENTIAL_UNAVAILABLE");
    Ok(())
}

#[tokio::test]
async fn service_account_flow_end_to_end() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let (token_addr, token_calls) = mock_token_server().await?;

    let dir = tempfile::tempdir()?;
    let mut key = fixture_key()?;
    key["token_uri"] = json!(format!("http://{token_addr}/token"));
    let key_path = dir.path().join("sa.json");
    std::fs::write(&key_path, serde_json::to_string(&key)?)?;
    let key_arg = key_path.to_string_lossy().into_owned();

    let cfg = config(&mock, &["--google-credentials", &key_arg]);
    let credentials = build_credentials(&cfg)?;
    assert!(credentials.has_source());
    let server = test_server(cfg, Arc::clone(&credentials))?;

    let body: Value = server
        .post("/api/v1/tools/hybrid_search")
        .json(&json!({ "collection": "WindBilance", "query": "nacelle" }))
        .await
        .json();
    assert_eq!(body["isError"], json!(false));
    assert_eq!(token_calls.load(Ordering::SeqCst), 1, "cached after first exchange");

    let recorded = mock.recorded().await;
    let vertex = recorded[0].headers.get(VERTEX_KEY_HEADER).and_then(|v| v.to_str().ok());
    assert_eq!(vertex, Some("ya29.minted-0-abcdefghijklmnop"));
    let project = recorded[0].headers.get("x-goog-user-project").and_then(|v| v.to_str().ok());
    assert_eq!(project, Some("wind-proj"));

    // Forced refresh mints a new token and bumps the version.
    let status: Value = server.post("/api/v1/credentials/refresh").await.json();
    assert_eq!(status["version"], json!(2));
    assert_eq!(token_calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn malformed_credential_file_is_startup_error() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let dir = tempfile::tempdir()?;
    let key_path = dir.path().join("broken.json");
    std::fs::write(&key_path, "{\"type\": \"service_account\"")?;
    let key_arg = key_path.to_string_lossy().into_owned();

    let cfg = config(&mock, &["--google-credentials", &key_arg]);
    assert_err_contains!(build_credentials(&cfg), "invalid credential");
    Ok(())
}

#[tokio::test]
async fn static_token_wins_over_credential_file() -> anyhow::Result<()> {
    let mock = spawn_mock_weaviate().await?;
    let cfg = config(&mock, &["--vertex-token", "static-abc", "--google-credentials", "/nonexistent.json"]);
    let credentials = build_credentials(&cfg)?;
    assert!(!credentials.has_source());
    let cred = credentials.acquire(std::time::Duration::from_secs(300)).await?;
    assert!(cred.expires_at().is_none());
    Ok(())
}
