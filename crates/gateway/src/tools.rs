// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool registry and dispatch.
//!
//! Every call produces a [`CallResult`]; failures become `isError` results
//! with a descriptive text instead of transport errors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{ErrorCode, ToolError};
use crate::state::GatewayState;
use crate::weaviate::{SearchKind, SearchRequest, HYBRID_RETURN_PROPERTIES};

const DEFAULT_LIMIT: u32 = 10;
const DEFAULT_ALPHA: f64 = 0.2;

/// Every tool the gateway can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    GetInstructions,
    ReloadInstructions,
    GetConfig,
    CheckConnection,
    ListCollections,
    GetSchema,
    KeywordSearch,
    SemanticSearch,
    HybridSearch,
    DiagnoseVertex,
}

impl Tool {
    pub const ALL: [Tool; 10] = [
        Tool::GetInstructions,
        Tool::ReloadInstructions,
        Tool::GetConfig,
        Tool::CheckConnection,
        Tool::ListCollections,
        Tool::GetSchema,
        Tool::KeywordSearch,
        Tool::SemanticSearch,
        Tool::HybridSearch,
        Tool::DiagnoseVertex,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetInstructions => "get_instructions",
            Self::ReloadInstructions => "reload_instructions",
            Self::GetConfig => "get_config",
            Self::CheckConnection => "check_connection",
            Self::ListCollections => "list_collections",
            Self::GetSchema => "get_schema",
            Self::KeywordSearch => "keyword_search",
            Self::SemanticSearch => "semantic_search",
            Self::HybridSearch => "hybrid_search",
            Self::DiagnoseVertex => "diagnose_vertex",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Hidden tools are callable but not listed.
    pub fn is_hidden(&self) -> bool {
        matches!(self, Self::KeywordSearch | Self::SemanticSearch | Self::DiagnoseVertex)
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let name = self.as_str();
        let (title, description, input_schema) = match self {
            Self::HybridSearch => (
                "Hybrid search (BM25 + vector)",
                "Combines BM25 keyword search with vector search. Primary tool for searching \
                 the document collection. Defaults: alpha=0.2, limit=10, \
                 query_properties=['caption','name'].",
                hybrid_schema(),
            ),
            Self::GetSchema => {
                ("Collection schema", "Class configuration of one collection.", collection_schema())
            }
            Self::KeywordSearch | Self::SemanticSearch => {
                (name, name, search_schema())
            }
            Self::DiagnoseVertex => (
                "Vertex credential diagnostics",
                "Credential state for the Vertex vectorizer. Set refresh=true to force a refresh.",
                json!({
                    "type": "object",
                    "properties": { "refresh": { "type": "boolean", "default": false } },
                    "additionalProperties": false
                }),
            ),
            _ => (name, name, free_schema()),
        };
        ToolDescriptor {
            name: name.to_owned(),
            title: title.to_owned(),
            description: description.to_owned(),
            input_schema,
            annotations: json!({
                "destructiveHint": false,
                "openWorldHint": true,
                "readOnlyHint": false
            }),
        }
    }
}

fn free_schema() -> Value {
    json!({ "type": "object", "properties": {}, "required": [], "additionalProperties": true })
}

fn collection_schema() -> Value {
    json!({
        "type": "object",
        "properties": { "collection": { "type": "string" } },
        "required": ["collection"]
    })
}

fn search_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "collection": { "type": "string" },
            "query": { "type": "string" },
            "limit": { "type": "integer", "default": DEFAULT_LIMIT }
        },
        "required": ["collection", "query"]
    })
}

fn hybrid_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "collection": { "type": "string", "description": "Collection name" },
            "query": { "type": "string", "description": "Text query" },
            "limit": {
                "type": "integer",
                "description": "Maximum number of results",
                "default": DEFAULT_LIMIT
            },
            "alpha": {
                "type": "number",
                "description": "Vector weight (0.0 = keyword only, 1.0 = vector only)",
                "default": DEFAULT_ALPHA
            },
            "query_properties": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Properties to search (default: ['caption', 'name'])"
            },
            "return_properties": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Ignored; results always carry name, source_pdf, page_index, mediaType"
            }
        },
        "required": ["collection", "query"],
        "additionalProperties": false
    })
}

/// Listed tool metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub title: String,
    pub description: String,
    pub input_schema: Value,
    pub annotations: Value,
}

/// Descriptors of all visible tools, in registry order.
pub fn list_tools() -> Vec<ToolDescriptor> {
    Tool::ALL.iter().filter(|t| !t.is_hidden()).map(Tool::descriptor).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Outcome of one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    pub content: Vec<TextContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    pub is_error: bool,
}

impl CallResult {
    fn text(text: String) -> Vec<TextContent> {
        vec![TextContent { kind: "text".to_owned(), text }]
    }

    /// Successful result. Non-object values are wrapped as `{"result": ...}`.
    pub fn success(tool: &str, value: Value) -> Self {
        let structured = match value {
            Value::Object(_) => value,
            other => json!({ "result": other }),
        };
        Self {
            content: Self::text(format!("Result of tool {tool} available in structuredContent.")),
            structured_content: Some(structured),
            is_error: false,
        }
    }

    pub fn error(text: String) -> Self {
        Self { content: Self::text(text), structured_content: None, is_error: true }
    }
}

// -- Arguments ----------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CollectionArgs {
    collection: String,
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    collection: String,
    query: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct HybridArgs {
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default = "default_alpha")]
    alpha: f64,
    #[serde(default)]
    query_properties: Option<QueryProperties>,
}

/// `query_properties` arrives either as an array or as a JSON-encoded string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueryProperties {
    List(Vec<String>),
    Text(String),
}

impl QueryProperties {
    fn into_list(self) -> Vec<String> {
        let list = match self {
            Self::List(list) => list,
            Self::Text(text) => serde_json::from_str::<Vec<String>>(&text)
                .unwrap_or_else(|_| vec![text.trim().to_owned()]),
        };
        list.into_iter().filter(|p| !p.is_empty()).collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct DiagnoseArgs {
    #[serde(default)]
    refresh: bool,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { Value::Object(Map::new()) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::bad_request(format!("invalid arguments: {e}")))
}

// -- Dispatch -----------------------------------------------------------------

/// Run tool `name` with JSON `args`.
pub async fn call_tool(state: &GatewayState, name: &str, args: Value) -> CallResult {
    let Some(tool) = Tool::from_name(name) else {
        let err = ToolError::new(ErrorCode::ToolNotFound, format!("Unknown tool: {name}"));
        tracing::warn!(tool = %name, code = %err.code, "unknown tool");
        return CallResult::error(err.message);
    };
    tracing::info!(tool = %name, "tool call");
    tracing::debug!(tool = %name, args = %args, "tool arguments");

    match dispatch(state, tool, args).await {
        Ok(value) => CallResult::success(name, value),
        Err(e) => {
            tracing::warn!(tool = %name, code = %e.code, err = %e.message, "tool call failed");
            CallResult::error(format!("Error calling tool {name}: {}", e.message))
        }
    }
}

async fn dispatch(state: &GatewayState, tool: Tool, args: Value) -> Result<Value, ToolError> {
    match tool {
        Tool::GetInstructions => to_value(state.instructions.snapshot().await),
        Tool::ReloadInstructions => to_value(state.instructions.reload().await),
        Tool::GetConfig => Ok(get_config(state)),
        Tool::CheckConnection => {
            let ready = state.weaviate.is_ready().await.map_err(ToolError::upstream)?;
            Ok(json!({ "ready": ready }))
        }
        Tool::ListCollections => {
            let names = state.weaviate.list_collections().await.map_err(ToolError::upstream)?;
            Ok(json!(names))
        }
        Tool::GetSchema => {
            let args: CollectionArgs = parse_args(args)?;
            match state.weaviate.get_schema(&args.collection).await.map_err(ToolError::upstream)? {
                Some(config) => Ok(json!({ "collection": args.collection, "config": config })),
                None => Ok(not_found(&args.collection)),
            }
        }
        Tool::KeywordSearch | Tool::SemanticSearch => {
            let args: SearchArgs = parse_args(args)?;
            let kind = if tool == Tool::KeywordSearch { SearchKind::Bm25 } else { SearchKind::NearText };
            search(
                state,
                SearchRequest {
                    collection: args.collection,
                    query: args.query,
                    limit: args.limit,
                    kind,
                    return_properties: vec![],
                },
            )
            .await
        }
        Tool::HybridSearch => hybrid_search(state, parse_args(args)?).await,
        Tool::DiagnoseVertex => diagnose_vertex(state, parse_args(args)?).await,
    }
}

fn to_value(value: impl Serialize) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::new(ErrorCode::Internal, e.to_string()))
}

fn not_found(collection: &str) -> Value {
    json!({ "error": format!("Collection '{collection}' not found") })
}

fn get_config(state: &GatewayState) -> Value {
    let config = &state.config;
    let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
    json!({
        "weaviate_url": config.weaviate_endpoint(),
        "weaviate_api_key_set": set(&config.weaviate_api_key),
        "openai_api_key_set": set(&config.openai_api_key),
        "cohere_api_key_set": set(&config.cohere_api_key),
        "vertex_use_oauth": config.vertex_use_oauth,
    })
}

async fn search(state: &GatewayState, req: SearchRequest) -> Result<Value, ToolError> {
    let collection = req.collection.clone();
    match state.weaviate.search(req).await.map_err(ToolError::upstream)? {
        Some(results) => to_value(results),
        None => Ok(not_found(&collection)),
    }
}

async fn hybrid_search(state: &GatewayState, args: HybridArgs) -> Result<Value, ToolError> {
    let query = args
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ToolError::bad_request("missing required parameter 'query' for hybrid_search"))?;

    let requested = args.collection.filter(|c| !c.is_empty());
    let collection = match (state.config.pinned_collection.as_deref(), requested) {
        (Some(pinned), Some(requested)) if requested != pinned => {
            tracing::warn!(requested = %requested, pinned = %pinned, "hybrid_search collection overridden");
            pinned.to_owned()
        }
        (_, Some(requested)) => requested,
        (Some(pinned), None) => pinned.to_owned(),
        (None, None) => return Err(ToolError::bad_request("missing required parameter 'collection'")),
    };

    search(
        state,
        SearchRequest {
            collection,
            query,
            limit: args.limit,
            kind: SearchKind::Hybrid {
                alpha: args.alpha,
                query_properties: args.query_properties.map(QueryProperties::into_list),
            },
            return_properties: HYBRID_RETURN_PROPERTIES.iter().map(|p| (*p).to_owned()).collect(),
        },
    )
    .await
}

async fn diagnose_vertex(state: &GatewayState, args: DiagnoseArgs) -> Result<Value, ToolError> {
    let refresh_error = if args.refresh {
        state.credentials.force_refresh().await.err().map(|e| ToolError::from(e).to_string())
    } else {
        None
    };
    let mut info = to_value(state.credentials.diagnostic_snapshot())?;
    if let Value::Object(ref mut map) = info {
        map.insert("oauth_enabled".to_owned(), json!(state.config.vertex_use_oauth));
        if let Some(err) = refresh_error {
            map.insert("refresh_error".to_owned(), json!(err));
        }
    }
    Ok(info)
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
