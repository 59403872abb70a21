// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential manager: the injectable service that owns the cache, the token
//! source, and the refresh scheduler.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use secrecy::Secret;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::cache::CredentialCache;
use crate::credential::Credential;
use crate::error::AuthError;
use crate::project::ProjectId;
use crate::scheduler::{self, RefreshPolicy, SchedulerHandle, StalePolicy};
use crate::source::TokenSource;

/// Keeps a Vertex bearer token fresh for the whole process.
///
/// Shared by `Arc` from the composition root. Foreground callers use
/// [`acquire`](Self::acquire); the optional background scheduler refreshes
/// proactively through the same commit path.
pub struct CredentialManager {
    cache: CredentialCache,
    source: Option<Arc<dyn TokenSource>>,
    source_label: String,
    policy: RefreshPolicy,
    /// Held for the duration of one exchange; at most one is ever in flight.
    refresh_lock: Mutex<()>,
    /// Completed exchanges, bumped after the outcome is recorded.
    attempts: AtomicU64,
    failures: AtomicU64,
    /// Most recent failure and the attempt number that produced it.
    last_failure: parking_lot::Mutex<Option<(u64, AuthError)>>,
    scheduler_started: AtomicBool,
    scheduler_running: AtomicBool,
}

impl CredentialManager {
    /// Manager backed by a token source.
    pub fn new(source: Arc<dyn TokenSource>, project: ProjectId, policy: RefreshPolicy) -> Arc<Self> {
        let source_label = source.describe();
        Arc::new(Self::build(Some(source), source_label, project, policy))
    }

    /// Manager serving a fixed token with no expiry. Never calls a source.
    pub fn with_static_token(
        token: String,
        project: ProjectId,
        policy: RefreshPolicy,
    ) -> Result<Arc<Self>, AuthError> {
        let manager = Self::build(None, "static override".to_owned(), project, policy);
        manager.cache.commit(&Secret::new(token), None)?;
        Ok(Arc::new(manager))
    }

    /// Manager with no way to obtain a token; every acquire fails descriptively.
    pub fn without_source(project: ProjectId, policy: RefreshPolicy) -> Arc<Self> {
        Arc::new(Self::build(None, "none".to_owned(), project, policy))
    }

    fn build(
        source: Option<Arc<dyn TokenSource>>,
        source_label: String,
        project: ProjectId,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            cache: CredentialCache::new(project),
            source,
            source_label,
            policy,
            refresh_lock: Mutex::new(()),
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_failure: parking_lot::Mutex::new(None),
            scheduler_started: AtomicBool::new(false),
            scheduler_running: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn cache(&self) -> &CredentialCache {
        &self.cache
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    /// Latest committed credential without refreshing. Never blocks on a refresh.
    pub fn get(&self) -> Option<Arc<Credential>> {
        self.cache.get()
    }

    /// Return a credential fresh for `margin`, refreshing inline if needed.
    ///
    /// Concurrent callers share a single exchange. When refresh fails and a
    /// stale credential exists, the [`StalePolicy`] decides whether it is
    /// served (logged as a stale credential) or rejected.
    pub async fn acquire(&self, margin: Duration) -> Result<Arc<Credential>, AuthError> {
        let observed = self.cache.get();
        if let Some(ref cred) = observed {
            if cred.is_fresh(margin) {
                return Ok(Arc::clone(cred));
            }
        }
        let observed_version = observed.as_ref().map_or(0, |c| c.version());

        let err = match self.refresh_after(observed_version).await {
            Ok(cred) => return Ok(cred),
            Err(e) => e,
        };

        let Some(stale) = self.cache.get() else {
            return Err(AuthError::NoCredentialAvailable(err.to_string()));
        };
        match self.policy.stale {
            StalePolicy::Serve => {
                tracing::warn!(
                    version = stale.version(),
                    token = %stale.token_prefix(),
                    err = %err,
                    "serving stale credential after failed refresh"
                );
                Ok(stale)
            }
            StalePolicy::Fail => Err(AuthError::StaleCredential(err.to_string())),
        }
    }

    /// Unconditionally exchange and commit a new token.
    ///
    /// With a static override and no source, returns the static credential.
    pub async fn force_refresh(&self) -> Result<Arc<Credential>, AuthError> {
        if self.source.is_none() {
            if let Some(cred) = self.cache.get() {
                return Ok(cred);
            }
        }
        let _guard = self.refresh_lock.lock().await;
        self.exchange_and_commit().await
    }

    /// Single-flight refresh relative to a version the caller has seen.
    ///
    /// If another task committed a newer version, or completed a failed
    /// attempt, while this one waited for the lock, that outcome is reused
    /// instead of starting a second exchange.
    pub(crate) async fn refresh_after(
        &self,
        observed_version: u64,
    ) -> Result<Arc<Credential>, AuthError> {
        let attempts_before = self.attempts.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.cache.get() {
            if current.version() > observed_version {
                return Ok(current);
            }
        }
        let attempts_now = self.attempts.load(Ordering::Acquire);
        if attempts_now != attempts_before {
            if let Some((attempt, ref err)) = *self.last_failure.lock() {
                if attempt == attempts_now {
                    return Err(err.clone());
                }
            }
        }
        self.exchange_and_commit().await
    }

    /// One exchange plus commit. Callers must hold `refresh_lock`.
    async fn exchange_and_commit(&self) -> Result<Arc<Credential>, AuthError> {
        let attempt = self.attempts.load(Ordering::Acquire) + 1;
        let result = match self.source {
            Some(ref source) => match source.fetch_token().await {
                Ok(fetched) => self.cache.commit(&fetched.token, fetched.expires_at),
                Err(e) => Err(e),
            },
            None => Err(AuthError::CredentialSourceMissing),
        };

        match result {
            Ok(cred) => {
                tracing::info!(
                    version = cred.version(),
                    token = %cred.token_prefix(),
                    expires_in_secs = cred.expires_in(SystemTime::now()).map(|d| d.as_secs()),
                    "vertex token refreshed"
                );
                self.attempts.store(attempt, Ordering::Release);
                Ok(cred)
            }
            Err(e) => {
                let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(attempt, failures, err = %e, "vertex token refresh failed");
                *self.last_failure.lock() = Some((attempt, e.clone()));
                self.attempts.store(attempt, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Start the background refresh loop.
    ///
    /// Returns `None` if it was already started or there is no token source.
    /// The loop stops when `shutdown` (or the handle) is cancelled.
    pub fn start_scheduler(
        self: &Arc<Self>,
        shutdown: &CancellationToken,
    ) -> Option<SchedulerHandle> {
        if self.source.is_none() {
            tracing::warn!("no token source configured; vertex token refresher not started");
            return None;
        }
        if self.scheduler_started.swap(true, Ordering::AcqRel) {
            return None;
        }
        tracing::info!(source = %self.source_label, "starting vertex token refresher");
        Some(scheduler::spawn(Arc::clone(self), shutdown.child_token()))
    }

    pub(crate) fn set_scheduler_running(&self, running: bool) {
        self.scheduler_running.store(running, Ordering::Release);
    }

    /// Read-only introspection. Never includes the full token.
    pub fn diagnostic_snapshot(&self) -> DiagnosticSnapshot {
        let now = SystemTime::now();
        let current = self.cache.get();
        DiagnosticSnapshot {
            project_id: self.cache.project_id().map(str::to_owned),
            token_prefix: current.as_ref().map(|c| c.token_prefix()),
            expires_at_epoch_secs: current
                .as_ref()
                .and_then(|c| c.expires_at())
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            expires_in_secs: current.as_ref().and_then(|c| c.expires_in(now)).map(|d| d.as_secs()),
            fresh: current.as_ref().is_some_and(|c| c.is_fresh_at(now, self.policy.margin)),
            version: current.as_ref().map_or(0, |c| c.version()),
            source: self.source_label.clone(),
            scheduler_running: self.scheduler_running.load(Ordering::Acquire),
            refresh_in_flight: self.refresh_lock.try_lock().is_err(),
            refresh_failures: self.failures.load(Ordering::Relaxed),
            last_error: self.last_failure.lock().as_ref().map(|(_, e)| e.to_string()),
        }
    }
}

/// Diagnostic view of the manager state.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSnapshot {
    pub project_id: Option<String>,
    pub token_prefix: Option<String>,
    pub expires_at_epoch_secs: Option<u64>,
    pub expires_in_secs: Option<u64>,
    pub fresh: bool,
    pub version: u64,
    pub source: String,
    pub scheduler_running: bool,
    pub refresh_in_flight: bool,
    pub refresh_failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("source", &self.source_label)
            .field("current", &self.cache.get())
            .field("failures", &self.failures.load(Ordering::Relaxed))
            .field("scheduler_running", &self.scheduler_running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
