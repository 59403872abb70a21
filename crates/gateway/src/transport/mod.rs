// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP transport for the tool gateway.

pub mod auth;
pub mod http;
pub mod http_cred;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::GatewayState;

/// Build the axum `Router` with all gateway routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/health", get(http::health))
        .route("/api/v1/health", get(http::health))
        // Tools
        .route("/api/v1/tools", get(http::list_tools))
        .route("/api/v1/tools/{name}", post(http::call_tool))
        // Vertex credential
        .route("/api/v1/credentials/status", get(http_cred::credentials_status))
        .route("/api/v1/credentials/refresh", post(http_cred::credentials_refresh))
        // Middleware
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_layer))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
