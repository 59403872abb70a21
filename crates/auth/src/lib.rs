// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Vertex credential refresh and propagation.
//!
//! A [`CredentialManager`] resolves a Google signing credential, exchanges it
//! for a short-lived bearer token, and keeps a process-wide
//! [`CredentialCache`] fresh, both on demand and from a background scheduler.
//! Callers attach the committed [`Credential`] to outbound HTTP headers or gRPC
//! metadata through [`AttachCredential`].

pub mod attach;
pub mod cache;
pub mod credential;
pub mod error;
pub mod manager;
pub mod project;
pub mod scheduler;
pub mod source;
pub mod test_support;

pub use attach::{AttachCredential, CredentialInterceptor};
pub use cache::CredentialCache;
pub use credential::{token_prefix, Credential, USER_PROJECT_HEADER, VERTEX_KEY_HEADER};
pub use error::AuthError;
pub use manager::{CredentialManager, DiagnosticSnapshot};
pub use project::ProjectId;
pub use scheduler::{RefreshPolicy, SchedulerHandle, StalePolicy};
pub use source::{
    default_discovery_paths, http_client, CredentialOrigin, GoogleTokenSource, KeyFile,
    SourceConfig, TokenSource, CLOUD_PLATFORM_SCOPE,
};
