// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide holder of the current credential.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use secrecy::{ExposeSecret, Secret};

use crate::credential::Credential;
use crate::error::AuthError;
use crate::project::ProjectId;

/// Holds the latest committed [`Credential`].
///
/// Each commit builds a complete new credential and swaps the `Arc` under a
/// short write lock, so readers observe either the previous value or the new
/// one in full. Versions strictly increase across commits.
pub struct CredentialCache {
    current: RwLock<Option<Arc<Credential>>>,
    project: ProjectId,
}

impl CredentialCache {
    pub fn new(project: ProjectId) -> Self {
        Self { current: RwLock::new(None), project }
    }

    /// Latest committed credential, if any refresh ever succeeded.
    pub fn get(&self) -> Option<Arc<Credential>> {
        self.current.read().clone()
    }

    /// Version of the latest commit, 0 before the first.
    pub fn version(&self) -> u64 {
        self.current.read().as_ref().map_or(0, |c| c.version())
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project.get()
    }

    /// Build a credential from `token` and swap it in.
    pub fn commit(
        &self,
        token: &Secret<String>,
        expires_at: Option<SystemTime>,
    ) -> Result<Arc<Credential>, AuthError> {
        let built = Credential::new(token.expose_secret().clone(), expires_at, self.project.get())?;
        let mut slot = self.current.write();
        let version = slot.as_ref().map_or(0, |c| c.version()) + 1;
        let credential = Arc::new(built.with_version(version));
        *slot = Some(Arc::clone(&credential));
        Ok(credential)
    }
}

/// Freshness check usable on any credential reference.
pub fn is_fresh(credential: &Credential, margin: Duration) -> bool {
    credential.is_fresh(margin)
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
