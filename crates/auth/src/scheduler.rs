// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background refresh loop and its timing policy.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manager::CredentialManager;

/// What `acquire` does when refresh fails but an expired credential exists.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalePolicy {
    /// Return the stale credential and let the downstream API decide.
    #[default]
    Serve,
    /// Fail with [`crate::AuthError::StaleCredential`].
    Fail,
}

impl std::fmt::Display for StalePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serve => f.write_str("serve"),
            Self::Fail => f.write_str("fail"),
        }
    }
}

impl std::str::FromStr for StalePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "serve" => Ok(Self::Serve),
            "fail" => Ok(Self::Fail),
            other => Err(format!("invalid stale policy: {other} (expected serve or fail)")),
        }
    }
}

/// Refresh timing knobs.
///
/// Defaults target Google's ~60 minute access tokens: refresh 5 minutes
/// before expiry, never wait longer than 55 minutes, retry failures after 60s.
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Safety margin subtracted from the reported expiry.
    pub margin: Duration,
    /// Upper bound on the wait between successful refreshes.
    pub ceiling: Duration,
    /// Wait used when the provider reports no expiry.
    pub fallback: Duration,
    /// Wait after a failed refresh.
    pub retry_backoff: Duration,
    /// Lower bound on any computed wait.
    pub min_delay: Duration,
    pub stale: StalePolicy,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: Duration::from_secs(300),
            ceiling: Duration::from_secs(55 * 60),
            fallback: Duration::from_secs(55 * 60),
            retry_backoff: Duration::from_secs(60),
            min_delay: Duration::from_secs(10),
            stale: StalePolicy::Serve,
        }
    }
}

impl RefreshPolicy {
    /// Delay until the next proactive refresh after a successful commit.
    ///
    /// `min(expires_at - now - margin, ceiling)`, floored at `min_delay`;
    /// `fallback` when the expiry is unknown.
    pub fn next_refresh_delay(&self, expires_at: Option<SystemTime>, now: SystemTime) -> Duration {
        let Some(expires_at) = expires_at else {
            return self.fallback;
        };
        let remaining = expires_at.duration_since(now).unwrap_or_default();
        remaining.saturating_sub(self.margin).min(self.ceiling).max(self.min_delay)
    }
}

/// Handle to a running refresh loop.
///
/// Owned by the process's shutdown sequence: [`SchedulerHandle::stop`]
/// cancels the idle wait and awaits the task. An exchange already in flight
/// is allowed to finish.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(err = %e, "refresh scheduler task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub(crate) fn spawn(manager: Arc<CredentialManager>, cancel: CancellationToken) -> SchedulerHandle {
    let task = tokio::spawn(run(manager, cancel.clone()));
    SchedulerHandle { cancel, task }
}

async fn run(manager: Arc<CredentialManager>, cancel: CancellationToken) {
    manager.set_scheduler_running(true);
    let policy = manager.policy().clone();

    // A credential committed just before start does not need an immediate refresh.
    let mut delay = match manager.get() {
        Some(cred) if cred.is_fresh(policy.margin) => {
            policy.next_refresh_delay(cred.expires_at(), SystemTime::now())
        }
        _ => Duration::ZERO,
    };

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = match manager.refresh_after(manager.cache().version()).await {
            Ok(cred) => policy.next_refresh_delay(cred.expires_at(), SystemTime::now()),
            Err(_) => policy.retry_backoff,
        };
        tracing::debug!(delay_secs = delay.as_secs(), "next vertex token refresh scheduled");
    }

    manager.set_scheduler_running(false);
    tracing::info!("vertex token refresher stopped");
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
