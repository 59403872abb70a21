// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token source: resolves a signing credential and exchanges it for a
//! short-lived bearer token.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// OAuth scope required by the Vertex AI vectorizer.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
const ADC_FILE: &str = "application_default_credentials.json";
const MAX_ERROR_BODY: usize = 256;

/// Where to look for the signing credential, in precedence order.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    /// Inline JSON credential blob (`GOOGLE_APPLICATION_CREDENTIALS_JSON`).
    pub inline_json: Option<String>,
    /// Explicit credential file (`GOOGLE_APPLICATION_CREDENTIALS`).
    pub credentials_path: Option<PathBuf>,
    /// Secondary credential file (`VERTEX_SA_PATH`).
    pub sa_path: Option<PathBuf>,
    /// Default discovery candidates, tried after the explicit sources.
    pub discovery_paths: Vec<PathBuf>,
    /// Project reported by the environment (`GOOGLE_CLOUD_PROJECT`), used
    /// only when no credential names one.
    pub default_project: Option<String>,
}

impl SourceConfig {
    /// Explicit sources in precedence order, then discovery candidates.
    fn candidate_paths(&self) -> impl Iterator<Item = (&Path, bool)> {
        let explicit = self.credentials_path.iter().chain(self.sa_path.iter());
        explicit
            .map(|p| (p.as_path(), false))
            .chain(self.discovery_paths.iter().map(|p| (p.as_path(), true)))
    }
}

/// Platform default discovery locations.
///
/// Checks the deployment secret mount, then the gcloud application default
/// credentials file (`$CLOUDSDK_CONFIG` or `$HOME/.config/gcloud`).
pub fn default_discovery_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/secrets/weaviate-sa.json")];
    if let Ok(dir) = std::env::var("CLOUDSDK_CONFIG") {
        paths.push(PathBuf::from(dir).join(ADC_FILE));
    } else if let Ok(home) = std::env::var("HOME") {
        paths.push(PathBuf::from(home).join(".config/gcloud").join(ADC_FILE));
    }
    paths
}

/// A parsed credential file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: Secret<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub quota_project_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUserKey {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub refresh_token: Secret<String>,
    #[serde(default)]
    pub quota_project_id: Option<String>,
}

impl KeyFile {
    pub fn parse(json: &str) -> Result<Self, AuthError> {
        Self::decode(json).map_err(AuthError::InvalidCredential)
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthError::InvalidCredential(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::decode(&contents)
            .map_err(|e| AuthError::InvalidCredential(format!("{}: {e}", path.display())))
    }

    fn decode(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }

    /// Billing project named by the credential, if any.
    pub fn project_id(&self) -> Option<&str> {
        match self {
            Self::ServiceAccount(sa) => {
                sa.project_id.as_deref().or(sa.quota_project_id.as_deref())
            }
            Self::AuthorizedUser(au) => au.quota_project_id.as_deref(),
        }
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum CredentialOrigin {
    InlineJson,
    File(PathBuf),
    Discovered(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub key: KeyFile,
    pub origin: CredentialOrigin,
}

/// Resolve the signing credential. First existing source wins.
///
/// A configured path that does not exist is skipped; a configured source that
/// exists but cannot be parsed is an error rather than a silent fallthrough.
/// Unusable discovered files are logged and skipped.
pub fn resolve(config: &SourceConfig) -> Result<ResolvedCredential, AuthError> {
    if let Some(ref json) = config.inline_json {
        let key = KeyFile::parse(json)?;
        return Ok(ResolvedCredential { key, origin: CredentialOrigin::InlineJson });
    }
    for (path, discovered) in config.candidate_paths() {
        if !path.exists() {
            continue;
        }
        if !discovered {
            let key = KeyFile::load(path)?;
            return Ok(ResolvedCredential { key, origin: CredentialOrigin::File(path.to_owned()) });
        }
        match KeyFile::load(path) {
            Ok(key) => {
                let origin = CredentialOrigin::Discovered(path.to_owned());
                return Ok(ResolvedCredential { key, origin });
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "skipping unusable discovered credential");
            }
        }
    }
    Err(AuthError::CredentialSourceMissing)
}

/// Find the billing project without requiring a usable signing key.
///
/// Unreadable sources are skipped here: the project is advisory and a broken
/// key surfaces through [`resolve`] anyway.
pub fn discover_project(config: &SourceConfig) -> Option<String> {
    if let Some(ref json) = config.inline_json {
        if let Some(project) = project_from_json(json) {
            return Some(project);
        }
    }
    for (path, _) in config.candidate_paths() {
        let Ok(contents) = std::fs::read_to_string(path) else {
            continue;
        };
        if let Some(project) = project_from_json(&contents) {
            return Some(project);
        }
    }
    config.default_project.clone()
}

fn project_from_json(json: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ProjectFields {
        #[serde(default)]
        project_id: Option<String>,
        #[serde(default)]
        quota_project_id: Option<String>,
    }
    let fields: ProjectFields = serde_json::from_str(json).ok()?;
    fields.project_id.or(fields.quota_project_id).filter(|p| !p.is_empty())
}

/// Output of one token exchange.
pub struct FetchedToken {
    pub token: Secret<String>,
    pub expires_at: Option<SystemTime>,
}

/// Exchanges a long-lived credential for a bearer token.
///
/// Implementations perform exactly one network exchange per call and never
/// touch shared state; committing the result is the caller's job.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<FetchedToken, AuthError>;

    /// Human-readable description for diagnostics. Must not contain secrets.
    fn describe(&self) -> String;
}

/// Standard OAuth2 token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Secret<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Token source backed by a Google credential file.
pub struct GoogleTokenSource {
    key: KeyFile,
    scope: String,
    token_uri: Option<String>,
    http: reqwest::Client,
}

impl GoogleTokenSource {
    pub fn new(key: KeyFile, scopes: &[&str]) -> Self {
        Self { key, scope: scopes.join(" "), token_uri: None, http: http_client() }
    }

    /// Resolve a credential from `config` and build a source for it.
    pub fn from_config(config: &SourceConfig) -> Result<(Self, CredentialOrigin), AuthError> {
        let resolved = resolve(config)?;
        Ok((Self::new(resolved.key, &[CLOUD_PLATFORM_SCOPE]), resolved.origin))
    }

    /// Override the token endpoint named by the credential file.
    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = Some(uri.into());
        self
    }

    pub fn key(&self) -> &KeyFile {
        &self.key
    }

    fn token_uri(&self) -> &str {
        if let Some(ref uri) = self.token_uri {
            return uri;
        }
        match &self.key {
            KeyFile::ServiceAccount(sa) => sa.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI),
            KeyFile::AuthorizedUser(_) => DEFAULT_TOKEN_URI,
        }
    }

    /// Build the signed RS256 JWT assertion for a service account.
    fn assertion(&self, sa: &ServiceAccountKey, now: u64) -> Result<String, AuthError> {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(sa.private_key.expose_secret().as_bytes())
            .map_err(|e| AuthError::InvalidCredential(format!("private_key: {e}")))?;
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = sa.private_key_id.clone();
        let claims = AssertionClaims {
            iss: &sa.client_email,
            scope: &self.scope,
            aud: self.token_uri(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| AuthError::InvalidCredential(format!("cannot sign assertion: {e}")))
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let resp = self.http.post(self.token_uri()).form(form).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let mut text = resp.text().await.unwrap_or_default();
            if let Some((idx, _)) = text.char_indices().nth(MAX_ERROR_BODY) {
                text.truncate(idx);
            }
            return Err(AuthError::TokenExchangeFailed(format!(
                "token endpoint returned {status}: {text}"
            )));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl TokenSource for GoogleTokenSource {
    async fn fetch_token(&self) -> Result<FetchedToken, AuthError> {
        let issued_at = SystemTime::now();
        let response = match &self.key {
            KeyFile::ServiceAccount(sa) => {
                let now = issued_at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
                let assertion = self.assertion(sa, now)?;
                self.post_form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
                    .await?
            }
            KeyFile::AuthorizedUser(au) => {
                self.post_form(&[
                    ("grant_type", "refresh_token"),
                    ("client_id", &au.client_id),
                    ("client_secret", au.client_secret.expose_secret()),
                    ("refresh_token", au.refresh_token.expose_secret()),
                ])
                .await?
            }
        };

        if response.access_token.expose_secret().is_empty() {
            return Err(AuthError::TokenExchangeFailed("empty access_token in response".into()));
        }
        let expires_at = response
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| issued_at + Duration::from_secs(secs));
        Ok(FetchedToken { token: response.access_token, expires_at })
    }

    fn describe(&self) -> String {
        match &self.key {
            KeyFile::ServiceAccount(sa) => format!("service_account {}", sa.client_email),
            KeyFile::AuthorizedUser(au) => format!("authorized_user {}", au.client_id),
        }
    }
}

/// Shared HTTP client setup: rustls with the ring provider, 30s timeout.
pub fn http_client() -> reqwest::Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    reqwest::Client::builder().timeout(Duration::from_secs(30)).build().unwrap_or_default()
}

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;
