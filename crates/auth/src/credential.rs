// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The committed credential and its derived transport representations.

use std::fmt;
use std::time::{Duration, SystemTime};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, Secret};

use crate::error::AuthError;

/// Header/metadata key carrying the Vertex bearer token.
pub const VERTEX_KEY_HEADER: &str = "x-goog-vertex-api-key";
/// Header/metadata key carrying the billing project.
pub const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Maximum number of token characters ever surfaced in logs or diagnostics.
const PREFIX_CHARS: usize = 8;

/// A bearer token plus everything derived from it.
///
/// Built once by [`Credential::new`] and never mutated afterwards: the header
/// map and the metadata list are both computed from `(token, project_id)` in
/// the same constructor, so they cannot drift apart.
pub struct Credential {
    token: Secret<String>,
    expires_at: Option<SystemTime>,
    project_id: Option<String>,
    headers: HeaderMap,
    metadata: Vec<(&'static str, Secret<String>)>,
    version: u64,
    committed_at: SystemTime,
}

impl Credential {
    pub fn new(
        token: String,
        expires_at: Option<SystemTime>,
        project_id: Option<&str>,
    ) -> Result<Self, AuthError> {
        let mut headers = HeaderMap::new();
        let mut key_value =
            HeaderValue::from_str(&token).map_err(|_| AuthError::InvalidToken("header"))?;
        key_value.set_sensitive(true);
        headers.insert(HeaderName::from_static(VERTEX_KEY_HEADER), key_value);

        let mut metadata = vec![(VERTEX_KEY_HEADER, Secret::new(token.clone()))];

        // The project is advisory; an unusable one is dropped, never fatal.
        let mut kept_project = None;
        if let Some(project) = project_id {
            match HeaderValue::from_str(project) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(USER_PROJECT_HEADER), value);
                    metadata.push((USER_PROJECT_HEADER, Secret::new(project.to_owned())));
                    kept_project = Some(project.to_owned());
                }
                Err(_) => {
                    tracing::warn!(project = %project.escape_debug(), "project id is not a valid header value, omitting");
                }
            }
        }

        Ok(Self {
            token: Secret::new(token),
            expires_at,
            project_id: kept_project,
            headers,
            metadata,
            version: 0,
            committed_at: SystemTime::now(),
        })
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// HTTP headers for outbound REST calls.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Ordered `(key, value)` pairs for gRPC metadata.
    pub fn metadata(&self) -> &[(&'static str, Secret<String>)] {
        &self.metadata
    }

    /// Commit sequence number (1 for the first commit of a cache).
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn committed_at(&self) -> SystemTime {
        self.committed_at
    }

    /// Non-sensitive prefix of the token for diagnostics.
    pub fn token_prefix(&self) -> String {
        token_prefix(self.token.expose_secret())
    }

    /// Whether the credential is still fresh at `now` given a safety margin.
    ///
    /// A credential without a reported expiry is always fresh.
    pub fn is_fresh_at(&self, now: SystemTime, margin: Duration) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => match expires_at.checked_sub(margin) {
                Some(deadline) => now < deadline,
                None => false,
            },
        }
    }

    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.is_fresh_at(SystemTime::now(), margin)
    }

    /// Time left before expiry, `None` when no expiry is known or it has passed.
    pub fn expires_in(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at.and_then(|exp| exp.duration_since(now).ok())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &self.token_prefix())
            .field("expires_at", &self.expires_at)
            .field("project_id", &self.project_id)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Return at most [`PREFIX_CHARS`] leading characters followed by `...`.
///
/// Short tokens reveal at most half of their characters.
pub fn token_prefix(token: &str) -> String {
    let count = token.chars().count();
    let shown = PREFIX_CHARS.min(count / 2);
    let prefix: String = token.chars().take(shown).collect();
    format!("{prefix}...")
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
