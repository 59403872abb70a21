// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attaching a committed credential to outbound transports.
//!
//! Each transport kind implements [`AttachCredential`] once. A transport with
//! no implementation cannot be handed a credential at all, so the mismatch is
//! caught at build time rather than silently skipped at runtime.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};
use tonic::{Request, Status};

use crate::credential::Credential;
use crate::error::AuthError;
use crate::manager::CredentialManager;

/// A transport carrier that can hold the credential's derived fields.
pub trait AttachCredential {
    /// Write the credential's entries, replacing any previous values for the
    /// same keys. Unrelated entries are left alone.
    fn attach(&mut self, credential: &Credential) -> Result<(), AuthError>;
}

impl AttachCredential for HeaderMap {
    fn attach(&mut self, credential: &Credential) -> Result<(), AuthError> {
        for (name, value) in credential.headers() {
            self.insert(name.clone(), value.clone());
        }
        Ok(())
    }
}

impl AttachCredential for MetadataMap {
    fn attach(&mut self, credential: &Credential) -> Result<(), AuthError> {
        for (key, value) in credential.metadata() {
            let key = AsciiMetadataKey::from_static(*key);
            let mut value = AsciiMetadataValue::try_from(value.expose_secret().as_str())
                .map_err(|_| AuthError::InvalidToken("metadata"))?;
            value.set_sensitive(true);
            self.insert(key, value);
        }
        Ok(())
    }
}

/// gRPC client interceptor that stamps the current credential on every call.
///
/// Reads the cache only; it never refreshes inline because interceptors are
/// synchronous. The background scheduler keeps the cache warm.
#[derive(Clone)]
pub struct CredentialInterceptor {
    manager: Arc<CredentialManager>,
}

impl CredentialInterceptor {
    pub fn new(manager: Arc<CredentialManager>) -> Self {
        Self { manager }
    }
}

impl tonic::service::Interceptor for CredentialInterceptor {
    fn call(&mut self, mut req: Request<()>) -> Result<Request<()>, Status> {
        let credential = self
            .manager
            .get()
            .ok_or_else(|| Status::unauthenticated("no vertex credential available"))?;
        req.metadata_mut()
            .attach(&credential)
            .map_err(|e| Status::unauthenticated(e.to_string()))?;
        Ok(req)
    }
}

#[cfg(test)]
#[path = "attach_tests.rs"]
mod tests;
