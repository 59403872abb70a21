// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;

use super::*;

const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/service-account.json");

fn fixture_json() -> anyhow::Result<String> {
    Ok(std::fs::read_to_string(FIXTURE)?)
}

fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, contents)?;
    Ok(path)
}

fn authorized_user_json(project: Option<&str>) -> String {
    let mut value = serde_json::json!({
        "type": "authorized_user",
        "client_id": "client-abc.apps.googleusercontent.com",
        "client_secret": "shh-secret",
        "refresh_token": "1//refresh-secret",
    });
    if let Some(p) = project {
        value["quota_project_id"] = serde_json::Value::String(p.to_owned());
    }
    value.to_string()
}

// -- Resolution ---------------------------------------------------------------

#[test]
fn inline_json_wins_over_paths() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_file(&dir, "sa.json", &fixture_json()?)?;
    let config = SourceConfig {
        inline_json: Some(authorized_user_json(None)),
        credentials_path: Some(path),
        ..Default::default()
    };

    let resolved = resolve(&config)?;
    assert_eq!(resolved.origin, CredentialOrigin::InlineJson);
    assert!(matches!(resolved.key, KeyFile::AuthorizedUser(_)));
    Ok(())
}

#[test]
fn credentials_path_then_sa_path() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sa_path = write_file(&dir, "vertex-sa.json", &fixture_json()?)?;
    let config = SourceConfig {
        credentials_path: Some(dir.path().join("missing.json")),
        sa_path: Some(sa_path.clone()),
        ..Default::default()
    };

    let resolved = resolve(&config)?;
    assert_eq!(resolved.origin, CredentialOrigin::File(sa_path));
    assert_eq!(resolved.key.project_id(), Some("wind-proj"));
    Ok(())
}

#[test]
fn discovery_is_last() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let discovered = write_file(&dir, "adc.json", &authorized_user_json(Some("quota-proj")))?;
    let config = SourceConfig {
        credentials_path: Some(dir.path().join("nope.json")),
        discovery_paths: vec![dir.path().join("also-missing.json"), discovered.clone()],
        ..Default::default()
    };

    let resolved = resolve(&config)?;
    assert_eq!(resolved.origin, CredentialOrigin::Discovered(discovered));
    assert_eq!(resolved.key.project_id(), Some("quota-proj"));
    Ok(())
}

#[test]
fn nothing_configured_is_source_missing() {
    let config = SourceConfig {
        discovery_paths: vec![PathBuf::from("/definitely/not/here.json")],
        ..Default::default()
    };
    assert!(matches!(resolve(&config), Err(AuthError::CredentialSourceMissing)));
}

#[test]
fn malformed_file_is_an_error_not_a_fallthrough() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = write_file(&dir, "broken.json", "{ not json")?;
    let good = write_file(&dir, "good.json", &fixture_json()?)?;
    let config = SourceConfig {
        credentials_path: Some(broken),
        sa_path: Some(good),
        ..Default::default()
    };
    assert!(matches!(resolve(&config), Err(AuthError::InvalidCredential(_))));
    Ok(())
}

#[test]
fn unusable_discovered_file_is_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let external = write_file(&dir, "adc.json", r#"{"type":"external_account","audience":"x"}"#)?;
    let broken = write_file(&dir, "mounted.json", "{ not json")?;
    let config = SourceConfig {
        discovery_paths: vec![broken.clone(), external.clone()],
        ..Default::default()
    };
    assert!(matches!(resolve(&config), Err(AuthError::CredentialSourceMissing)));

    let good = write_file(&dir, "good.json", &fixture_json()?)?;
    let config = SourceConfig {
        discovery_paths: vec![external, broken, good.clone()],
        ..Default::default()
    };
    assert_eq!(resolve(&config)?.origin, CredentialOrigin::Discovered(good));
    Ok(())
}

#[test]
fn file_error_names_path_once() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = write_file(&dir, "broken.json", "{ not json")?;
    let message = match KeyFile::load(&broken) {
        Err(e) => e.to_string(),
        Ok(_) => anyhow::bail!("expected a parse failure"),
    };
    assert!(message.starts_with("invalid credential: "), "{message}");
    assert!(message.contains("broken.json"), "{message}");
    assert_eq!(message.matches("invalid credential").count(), 1, "{message}");
    Ok(())
}

#[test]
fn unknown_credential_type_is_rejected() {
    let result = KeyFile::parse(r#"{"type":"external_account","audience":"x"}"#);
    assert!(matches!(result, Err(AuthError::InvalidCredential(_))));
}

#[test]
fn key_debug_output_redacts_secrets() -> anyhow::Result<()> {
    let key = KeyFile::parse(&authorized_user_json(None))?;
    let debug = format!("{key:?}");
    assert!(!debug.contains("shh-secret"));
    assert!(!debug.contains("1//refresh-secret"));
    Ok(())
}

// -- Project discovery --------------------------------------------------------

#[test]
fn project_from_inline_json() {
    let config = SourceConfig {
        inline_json: Some(r#"{"project_id":"inline-proj"}"#.to_owned()),
        default_project: Some("env-proj".to_owned()),
        ..Default::default()
    };
    assert_eq!(discover_project(&config).as_deref(), Some("inline-proj"));
}

#[test]
fn project_skips_unreadable_sources() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let broken = write_file(&dir, "broken.json", "garbage")?;
    let quota = write_file(&dir, "adc.json", &authorized_user_json(Some("quota-proj")))?;
    let config = SourceConfig {
        inline_json: Some("also garbage".to_owned()),
        credentials_path: Some(broken),
        discovery_paths: vec![quota],
        ..Default::default()
    };
    assert_eq!(discover_project(&config).as_deref(), Some("quota-proj"));
    Ok(())
}

#[test]
fn project_falls_back_to_environment() {
    let config =
        SourceConfig { default_project: Some("env-proj".to_owned()), ..Default::default() };
    assert_eq!(discover_project(&config).as_deref(), Some("env-proj"));
}

// -- Token exchange -----------------------------------------------------------

/// Start a mock OAuth token endpoint. Records every request body.
async fn mock_token_server(
    status: u16,
    body: String,
) -> anyhow::Result<(SocketAddr, Arc<AtomicU32>, Arc<parking_lot::Mutex<Vec<String>>>)> {
    let call_count = Arc::new(AtomicU32::new(0));
    let bodies = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let count = Arc::clone(&call_count);
    let seen = Arc::clone(&bodies);

    let app = Router::new().route(
        "/token",
        post(move |req_body: String| {
            let count = Arc::clone(&count);
            let seen = Arc::clone(&seen);
            let body = body.clone();
            async move {
                count.fetch_add(1, Ordering::Relaxed);
                seen.lock().push(req_body);
                (
                    axum::http::StatusCode::from_u16(status)
                        .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                    body,
                )
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    Ok((addr, call_count, bodies))
}

#[tokio::test]
async fn service_account_exchange_signs_assertion() -> anyhow::Result<()> {
    let ok = serde_json::json!({
        "access_token": "ya29.fresh-token",
        "expires_in": 3599,
        "token_type": "Bearer"
    })
    .to_string();
    let (addr, calls, bodies) = mock_token_server(200, ok).await?;

    let key = KeyFile::parse(&fixture_json()?)?;
    let source = GoogleTokenSource::new(key, &[CLOUD_PLATFORM_SCOPE])
        .with_token_uri(format!("http://{addr}/token"));

    let before = SystemTime::now();
    let fetched = source.fetch_token().await?;
    assert_eq!(fetched.token.expose_secret(), "ya29.fresh-token");
    let expires_at = fetched.expires_at.ok_or_else(|| anyhow::anyhow!("expected expiry"))?;
    assert!(expires_at >= before + Duration::from_secs(3599));

    assert_eq!(calls.load(Ordering::Relaxed), 1);
    let body = bodies.lock().first().cloned().unwrap_or_default();
    assert!(body.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
    let assertion = body
        .split('&')
        .find_map(|pair| pair.strip_prefix("assertion="))
        .ok_or_else(|| anyhow::anyhow!("missing assertion in {body}"))?;
    assert_eq!(assertion.split('.').count(), 3, "assertion should be a JWT");
    Ok(())
}

#[tokio::test]
async fn authorized_user_uses_refresh_grant() -> anyhow::Result<()> {
    let ok = serde_json::json!({ "access_token": "ya29.user-token" }).to_string();
    let (addr, _calls, bodies) = mock_token_server(200, ok).await?;

    let key = KeyFile::parse(&authorized_user_json(None))?;
    let source = GoogleTokenSource::new(key, &[CLOUD_PLATFORM_SCOPE])
        .with_token_uri(format!("http://{addr}/token"));

    let fetched = source.fetch_token().await?;
    assert_eq!(fetched.token.expose_secret(), "ya29.user-token");
    assert!(fetched.expires_at.is_none(), "no expires_in means no expiry");

    let body = bodies.lock().first().cloned().unwrap_or_default();
    assert!(body.contains("grant_type=refresh_token"));
    assert!(body.contains("client_id=client-abc.apps.googleusercontent.com"));
    Ok(())
}

#[tokio::test]
async fn provider_error_is_exchange_failure_without_retry() -> anyhow::Result<()> {
    let err = serde_json::json!({ "error": "invalid_grant" }).to_string();
    let (addr, calls, _bodies) = mock_token_server(400, err).await?;

    let key = KeyFile::parse(&fixture_json()?)?;
    let source = GoogleTokenSource::new(key, &[CLOUD_PLATFORM_SCOPE])
        .with_token_uri(format!("http://{addr}/token"));

    let result = source.fetch_token().await;
    match result {
        Err(AuthError::TokenExchangeFailed(msg)) => assert!(msg.contains("invalid_grant")),
        Err(other) => anyhow::bail!("expected TokenExchangeFailed, got {other:?}"),
        Ok(_) => anyhow::bail!("expected failure"),
    }
    assert_eq!(calls.load(Ordering::Relaxed), 1);
    Ok(())
}

#[tokio::test]
async fn empty_access_token_is_rejected() -> anyhow::Result<()> {
    let ok = serde_json::json!({ "access_token": "", "expires_in": 3600 }).to_string();
    let (addr, _calls, _bodies) = mock_token_server(200, ok).await?;

    let key = KeyFile::parse(&authorized_user_json(None))?;
    let source = GoogleTokenSource::new(key, &[CLOUD_PLATFORM_SCOPE])
        .with_token_uri(format!("http://{addr}/token"));

    assert!(matches!(source.fetch_token().await, Err(AuthError::TokenExchangeFailed(_))));
    Ok(())
}

#[tokio::test]
async fn unreachable_endpoint_is_exchange_failure() -> anyhow::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let key = KeyFile::parse(&fixture_json()?)?;
    let source = GoogleTokenSource::new(key, &[CLOUD_PLATFORM_SCOPE])
        .with_token_uri(format!("http://{addr}/token"));
    assert!(matches!(source.fetch_token().await, Err(AuthError::TokenExchangeFailed(_))));
    Ok(())
}

#[test]
fn describe_names_identity_only() -> anyhow::Result<()> {
    let key = KeyFile::parse(&fixture_json()?)?;
    let source = GoogleTokenSource::new(key, &[CLOUD_PLATFORM_SCOPE]);
    let described = source.describe();
    assert_eq!(described, "service_account weaviate-vectorizer@wind-proj.iam.gserviceaccount.com");
    assert!(!described.contains("PRIVATE KEY"));
    Ok(())
}
