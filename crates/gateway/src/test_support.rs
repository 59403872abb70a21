// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: a mock Weaviate server and assertion helpers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Class served by the mock.
pub const MOCK_CLASS: &str = "WindBilance";

/// One request seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

/// Handle to a running mock Weaviate.
pub struct MockWeaviate {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockWeaviate {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn recorded(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// GraphQL query strings, in arrival order.
    pub async fn graphql_queries(&self) -> Vec<String> {
        self.recorded()
            .await
            .into_iter()
            .filter(|r| r.path == "/v1/graphql")
            .filter_map(|r| r.body?.get("query")?.as_str().map(str::to_owned))
            .collect()
    }
}

fn class_schema() -> Value {
    json!({
        "class": MOCK_CLASS,
        "vectorizer": "text2vec-palm",
        "properties": [
            { "name": "name", "dataType": ["text"] },
            { "name": "source_pdf", "dataType": ["text"] },
            { "name": "page_index", "dataType": ["int"] },
            { "name": "mediaType", "dataType": ["text"] },
            { "name": "caption", "dataType": ["text"] },
            { "name": "relatedTo", "dataType": ["Other"] }
        ]
    })
}

fn graphql_response() -> Value {
    json!({
        "data": { "Get": { MOCK_CLASS: [
            {
                "name": "Turbine T-200",
                "source_pdf": "bilance.pdf",
                "page_index": 4,
                "mediaType": "image",
                "_additional": {
                    "id": "00000000-0000-0000-0000-000000000001",
                    "score": "0.91",
                    "distance": 0.12
                }
            },
            {
                "name": "Rotor hub",
                "source_pdf": "bilance.pdf",
                "page_index": 7,
                "mediaType": "text",
                "_additional": {
                    "id": "00000000-0000-0000-0000-000000000002",
                    "score": "0.40",
                    "distance": null
                }
            }
        ]}}
    })
}

/// Spawn a mock Weaviate on `127.0.0.1:0`.
///
/// Serves readiness, a schema with one class ([`MOCK_CLASS`]) plus a
/// second listed class, and a GraphQL endpoint that always returns two hits.
pub async fn spawn_mock_weaviate() -> anyhow::Result<MockWeaviate> {
    let requests: Arc<Mutex<Vec<RecordedRequest>>> = Arc::default();

    let rec = Arc::clone(&requests);
    let ready = move |headers: HeaderMap| {
        let rec = Arc::clone(&rec);
        async move {
            rec.lock().await.push(RecordedRequest {
                path: "/v1/.well-known/ready".into(),
                headers,
                body: None,
            });
            StatusCode::OK
        }
    };

    let rec = Arc::clone(&requests);
    let schema = move |headers: HeaderMap| {
        let rec = Arc::clone(&rec);
        async move {
            rec.lock().await.push(RecordedRequest { path: "/v1/schema".into(), headers, body: None });
            Json(json!({ "classes": [class_schema(), { "class": "Other" }, class_schema()] }))
        }
    };

    let rec = Arc::clone(&requests);
    let class = move |Path(name): Path<String>, headers: HeaderMap| {
        let rec = Arc::clone(&rec);
        async move {
            rec.lock().await.push(RecordedRequest {
                path: format!("/v1/schema/{name}"),
                headers,
                body: None,
            });
            if name == MOCK_CLASS {
                (StatusCode::OK, Json(class_schema()))
            } else {
                (StatusCode::NOT_FOUND, Json(json!({ "error": [{ "message": "not found" }] })))
            }
        }
    };

    let rec = Arc::clone(&requests);
    let graphql = move |headers: HeaderMap, Json(body): Json<Value>| {
        let rec = Arc::clone(&rec);
        async move {
            rec.lock().await.push(RecordedRequest {
                path: "/v1/graphql".into(),
                headers,
                body: Some(body),
            });
            Json(graphql_response())
        }
    };

    let app = Router::new()
        .route("/v1/.well-known/ready", get(ready))
        .route("/v1/schema", get(schema))
        .route("/v1/schema/{name}", get(class))
        .route("/v1/graphql", post(graphql));

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    Ok(MockWeaviate { addr, requests })
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
