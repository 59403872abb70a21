// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors surfaced by the credential subsystem.
///
/// Only the refresh scheduler turns these into retries; every other layer
/// returns them to its caller.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// No signing credential could be resolved from any configured source.
    #[error("no signing credential found (checked inline json, credential path, default discovery)")]
    CredentialSourceMissing,

    /// A credential was found but could not be parsed or used.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The network exchange with the identity provider failed.
    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    /// The cache is empty and an inline refresh failed.
    #[error("no credential available: {0}")]
    NoCredentialAvailable(String),

    /// Refresh failed and the stale policy forbids serving the old credential.
    #[error("credential is stale and refresh failed: {0}")]
    StaleCredential(String),

    /// The token cannot be represented as a header or metadata value.
    #[error("token is not a valid {0} value")]
    InvalidToken(&'static str),
}

impl AuthError {
    /// Short machine-readable code, used by API layers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialSourceMissing => "CREDENTIAL_SOURCE_MISSING",
            Self::InvalidCredential(_) => "INVALID_CREDENTIAL",
            Self::TokenExchangeFailed(_) => "TOKEN_EXCHANGE_FAILED",
            Self::NoCredentialAvailable(_) => "NO_CREDENTIAL_AVAILABLE",
            Self::StaleCredential(_) => "STALE_CREDENTIAL",
            Self::InvalidToken(_) => "INVALID_TOKEN",
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        Self::TokenExchangeFailed(e.to_string())
    }
}
