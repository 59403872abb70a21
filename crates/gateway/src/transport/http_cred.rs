// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the Vertex credential endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ErrorCode;
use crate::state::GatewayState;

/// `GET /api/v1/credentials/status`: diagnostic snapshot, never the token.
pub async fn credentials_status(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(s.credentials.diagnostic_snapshot())
}

/// `POST /api/v1/credentials/refresh`: force a token exchange now.
pub async fn credentials_refresh(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    match s.credentials.force_refresh().await {
        Ok(cred) => {
            tracing::info!(version = cred.version(), "vertex token refreshed on request");
            Json(s.credentials.diagnostic_snapshot()).into_response()
        }
        Err(e) => ErrorCode::CredentialUnavailable.to_http_response(e.to_string()).into_response(),
    }
}
