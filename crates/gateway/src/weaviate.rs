// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the Weaviate REST and GraphQL endpoints.
//!
//! Every request carries the Weaviate API key, the OpenAI key when
//! configured, and the current Vertex credential headers.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value};
use weavegate_auth::{http_client, AttachCredential, CredentialManager};

const OPENAI_KEY_HEADER: &str = "x-openai-api-key";

/// Properties returned by hybrid search.
pub const HYBRID_RETURN_PROPERTIES: &[&str] = &["name", "source_pdf", "page_index", "mediaType"];

/// One search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub uuid: String,
    pub properties: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bm25_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// Search output returned to tool callers.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub count: usize,
    pub results: Vec<SearchHit>,
}

impl From<Vec<SearchHit>> for SearchResults {
    fn from(results: Vec<SearchHit>) -> Self {
        Self { count: results.len(), results }
    }
}

/// Which GraphQL search operator to run.
#[derive(Debug, Clone)]
pub enum SearchKind {
    Bm25,
    NearText,
    Hybrid { alpha: f64, query_properties: Option<Vec<String>> },
}

/// A fully specified search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub collection: String,
    pub query: String,
    pub limit: u32,
    pub kind: SearchKind,
    /// Properties to return. Empty means all scalar properties of the class.
    pub return_properties: Vec<String>,
}

pub struct WeaviateClient {
    base_url: String,
    api_key: Option<String>,
    openai_key: Option<String>,
    credentials: Arc<CredentialManager>,
    margin: Duration,
    client: Client,
}

impl WeaviateClient {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        openai_key: Option<String>,
        credentials: Arc<CredentialManager>,
        margin: Duration,
    ) -> Self {
        Self { base_url, api_key, openai_key, credentials, margin, client: http_client() }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Outbound headers for one request.
    ///
    /// A missing Vertex credential is logged and the request goes out
    /// without it; Weaviate rejects the call if the vectorizer needs it.
    async fn headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(ref key) = self.api_key {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);
        }
        if let Some(ref key) = self.openai_key {
            headers.insert(HeaderName::from_static(OPENAI_KEY_HEADER), HeaderValue::from_str(key)?);
        }
        match self.credentials.acquire(self.margin).await {
            Ok(cred) => headers.attach(&cred)?,
            Err(e) => {
                if self.credentials.has_source() {
                    tracing::warn!(err = %e, "sending weaviate request without vertex credential");
                } else {
                    tracing::debug!(err = %e, "no vertex credential configured");
                }
            }
        }
        Ok(headers)
    }

    async fn get(&self, path: &str) -> anyhow::Result<reqwest::Response> {
        let headers = self.headers().await?;
        Ok(self.client.get(self.url(path)).headers(headers).send().await?)
    }

    /// `GET /v1/.well-known/ready`.
    pub async fn is_ready(&self) -> anyhow::Result<bool> {
        let resp = self.get("/v1/.well-known/ready").await?;
        Ok(resp.status().is_success())
    }

    /// Sorted, de-duplicated class names from `GET /v1/schema`.
    pub async fn list_collections(&self) -> anyhow::Result<Vec<String>> {
        let schema: Value = self.get("/v1/schema").await?.error_for_status()?.json().await?;
        let mut names: Vec<String> = schema
            .get("classes")
            .and_then(Value::as_array)
            .map(|classes| {
                classes
                    .iter()
                    .filter_map(|c| c.get("class").and_then(Value::as_str))
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names.dedup();
        Ok(names)
    }

    /// Class configuration, or `None` when the class does not exist.
    pub async fn get_schema(&self, collection: &str) -> anyhow::Result<Option<Value>> {
        validate_class_name(collection)?;
        let resp = self.get(&format!("/v1/schema/{collection}")).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }

    /// Run a search. Returns `None` when the collection does not exist.
    pub async fn search(&self, mut req: SearchRequest) -> anyhow::Result<Option<SearchResults>> {
        let Some(schema) = self.get_schema(&req.collection).await? else {
            return Ok(None);
        };
        if req.return_properties.is_empty() {
            req.return_properties = scalar_properties(&schema);
        }
        let query = build_graphql(&req)?;
        tracing::debug!(collection = %req.collection, "weaviate graphql search");

        let headers = self.headers().await?;
        let resp = self
            .client
            .post(self.url("/v1/graphql"))
            .headers(headers)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await?
            .error_for_status()?;
        let body: Value = resp.json().await?;
        Ok(Some(parse_hits(&body, &req.collection)?.into()))
    }
}

/// Class names start with an uppercase letter; the rest is `[_0-9A-Za-z]`.
pub fn validate_class_name(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("invalid collection name: {name:?}");
    }
    Ok(())
}

fn validate_property_name(name: &str) -> anyhow::Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("invalid property name: {name:?}");
    }
    Ok(())
}

/// Property names whose data type is a primitive (cross-references start
/// with an uppercase class name and cannot be selected as scalars).
fn scalar_properties(schema: &Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(Value::as_array)
        .map(|props| {
            props
                .iter()
                .filter(|p| {
                    p.get("dataType")
                        .and_then(Value::as_array)
                        .and_then(|t| t.first())
                        .and_then(Value::as_str)
                        .is_some_and(|t| t.starts_with(|c: char| c.is_ascii_lowercase()))
                })
                .filter_map(|p| p.get("name").and_then(Value::as_str))
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Render the GraphQL `Get` query. Strings are quoted with JSON escaping.
pub fn build_graphql(req: &SearchRequest) -> anyhow::Result<String> {
    validate_class_name(&req.collection)?;
    for prop in &req.return_properties {
        validate_property_name(prop)?;
    }
    let query = serde_json::to_string(&req.query)?;

    let (operator, additional) = match &req.kind {
        SearchKind::Bm25 => (format!("bm25: {{query: {query}}}"), "id score"),
        SearchKind::NearText => (format!("nearText: {{concepts: [{query}]}}"), "id distance"),
        SearchKind::Hybrid { alpha, query_properties } => {
            let mut args = format!("query: {query}, alpha: {alpha}");
            if let Some(props) = query_properties.as_ref().filter(|p| !p.is_empty()) {
                for prop in props {
                    validate_property_name(prop)?;
                }
                args.push_str(&format!(", properties: {}", serde_json::to_string(props)?));
            }
            (format!("hybrid: {{{args}}}"), "id score distance")
        }
    };

    let fields = req.return_properties.join(" ");
    Ok(format!(
        "{{ Get {{ {class}({operator}, limit: {limit}) {{ {fields} _additional {{ {additional} }} }} }} }}",
        class = req.collection,
        limit = req.limit,
    ))
}

/// Extract hits from a GraphQL response.
pub fn parse_hits(body: &Value, collection: &str) -> anyhow::Result<Vec<SearchHit>> {
    if let Some(errors) = body.get("errors").and_then(Value::as_array).filter(|e| !e.is_empty()) {
        let messages: Vec<&str> =
            errors.iter().filter_map(|e| e.get("message").and_then(Value::as_str)).collect();
        anyhow::bail!("weaviate graphql error: {}", messages.join("; "));
    }
    let objects = body
        .pointer(&format!("/data/Get/{collection}"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(objects
        .into_iter()
        .filter_map(|obj| match obj {
            Value::Object(mut map) => {
                let additional = map.remove("_additional").unwrap_or(Value::Null);
                Some(SearchHit {
                    uuid: additional.get("id").and_then(Value::as_str).unwrap_or_default().to_owned(),
                    properties: map,
                    bm25_score: additional.get("score").and_then(as_f64),
                    distance: additional.get("distance").and_then(as_f64),
                })
            }
            _ => None,
        })
        .collect())
}

/// Weaviate reports scores as strings and distances as numbers.
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
#[path = "weaviate_tests.rs"]
mod tests;
