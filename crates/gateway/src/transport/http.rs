// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for health and tool calls.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::state::GatewayState;
use crate::tools::{self, CallResult, ToolDescriptor};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize)]
pub struct ToolListResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// `GET /health`, `GET /api/v1/health`
pub async fn health(State(s): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse { status: "ok".to_owned(), service: s.config.server_name.clone() })
}

/// `GET /api/v1/tools`: visible tools only.
pub async fn list_tools() -> impl IntoResponse {
    Json(ToolListResponse { tools: tools::list_tools() })
}

/// `POST /api/v1/tools/{name}`: run a tool with a JSON object body.
///
/// An empty body means no arguments. Malformed JSON is an `isError` result.
pub async fn call_tool(
    State(s): State<Arc<GatewayState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return Json(CallResult::error(format!(
                    "Error calling tool {name}: invalid JSON arguments: {e}"
                )))
            }
        }
    };
    Json(tools::call_tool(&s, &name, args).await)
}
