// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Weavegate: Weaviate search tools with Vertex credential refresh.

pub mod config;
pub mod error;
pub mod instructions;
pub mod state;
pub mod test_support;
pub mod tools;
pub mod transport;
pub mod weaviate;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use weavegate_auth::{CredentialManager, GoogleTokenSource, ProjectId};

use crate::config::GatewayConfig;
use crate::state::GatewayState;
use crate::transport::build_router;

/// Build the credential manager from configuration.
///
/// Precedence: static token, then a resolved signing credential, then a
/// sourceless manager whose acquires fail descriptively. A credential that
/// exists but cannot be parsed is a startup error.
pub fn build_credentials(config: &GatewayConfig) -> anyhow::Result<Arc<CredentialManager>> {
    let source_config = config.source_config();
    let policy = config.refresh_policy();

    if let Some(ref token) = config.vertex_token {
        tracing::info!("using static vertex token");
        let project = ProjectId::discover(source_config);
        return Ok(CredentialManager::with_static_token(token.clone(), project, policy)?);
    }

    match GoogleTokenSource::from_config(&source_config) {
        Ok((source, origin)) => {
            tracing::info!(origin = ?origin, "vertex signing credential resolved");
            let project = ProjectId::discover(source_config);
            Ok(CredentialManager::new(Arc::new(source), project, policy))
        }
        Err(weavegate_auth::AuthError::CredentialSourceMissing) => {
            tracing::warn!("no vertex signing credential found; vectorizer requests go without it");
            Ok(CredentialManager::without_source(ProjectId::discover(source_config), policy))
        }
        Err(e) => Err(e.into()),
    }
}

/// Run the gateway until shutdown.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    config.validate()?;
    let addr = format!("{}:{}", config.host, config.port);
    let shutdown = CancellationToken::new();

    let credentials = build_credentials(&config)?;
    if credentials.has_source() || credentials.get().is_some() {
        // Warm the cache; a failure here is retried by the scheduler or on demand.
        match credentials.acquire(config.refresh_margin()).await {
            Ok(cred) => tracing::info!(version = cred.version(), "vertex credential ready"),
            Err(e) => tracing::warn!(err = %e, "initial vertex token fetch failed"),
        }
    }

    let scheduler = if config.vertex_use_oauth {
        credentials.start_scheduler(&shutdown)
    } else {
        None
    };

    let state = Arc::new(GatewayState::new(config, credentials, shutdown.clone()));
    let router = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("weavegate listening on {addr}");

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }

    let served =
        axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await;
    shutdown.cancel();
    if let Some(handle) = scheduler {
        handle.stop().await;
    }
    served?;
    Ok(())
}
