// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::OnceLock;

use crate::source::{discover_project, SourceConfig};

/// Billing project, resolved lazily and cached for the process lifetime.
///
/// Once found it is never re-resolved. Until then every lookup retries
/// discovery; two racing first lookups compute the same value.
pub struct ProjectId {
    resolved: OnceLock<String>,
    config: Option<SourceConfig>,
}

impl ProjectId {
    /// Discover from the credential sources on first use.
    pub fn discover(config: SourceConfig) -> Self {
        Self { resolved: OnceLock::new(), config: Some(config) }
    }

    /// A project known up front (or known to be absent).
    pub fn fixed(project: Option<String>) -> Self {
        let resolved = OnceLock::new();
        if let Some(p) = project {
            let _ = resolved.set(p);
        }
        Self { resolved, config: None }
    }

    pub fn get(&self) -> Option<&str> {
        if let Some(project) = self.resolved.get() {
            return Some(project);
        }
        let found = discover_project(self.config.as_ref()?)?;
        if self.resolved.set(found).is_ok() {
            if let Some(project) = self.resolved.get() {
                tracing::info!(project = %project, "detected credential project");
            }
        }
        self.resolved.get().map(String::as_str)
    }
}
