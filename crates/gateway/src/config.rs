// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use weavegate_auth::{default_discovery_paths, RefreshPolicy, SourceConfig, StalePolicy};

/// Configuration for the weavegate tool server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "weavegate", version, about = "Weaviate search tools with Vertex credential refresh")]
pub struct GatewayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "WEAVEGATE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 10000, env = "PORT")]
    pub port: u16,

    /// Bearer token for inbound API auth. If unset, auth is disabled.
    #[arg(long, env = "WEAVEGATE_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Weaviate endpoint.
    #[arg(long, env = "WEAVIATE_URL")]
    pub weaviate_url: Option<String>,

    /// Weaviate Cloud cluster endpoint. Takes precedence over `--weaviate-url`.
    #[arg(long, env = "WEAVIATE_CLUSTER_URL")]
    pub weaviate_cluster_url: Option<String>,

    #[arg(long, env = "WEAVIATE_API_KEY")]
    pub weaviate_api_key: Option<String>,

    /// Forwarded to Weaviate as `X-OpenAI-Api-Key`.
    #[arg(long, env = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,

    /// Reported by `get_config` only.
    #[arg(long, env = "COHERE_API_KEY")]
    pub cohere_api_key: Option<String>,

    /// Run the background Vertex token refresher.
    #[arg(
        long,
        env = "VERTEX_USE_OAUTH",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_flag
    )]
    pub vertex_use_oauth: bool,

    /// Path to a Google credential file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub google_credentials: Option<PathBuf>,

    /// Inline Google credential JSON.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS_JSON", hide_env_values = true)]
    pub google_credentials_json: Option<String>,

    /// Service account key file, tried after `--google-credentials`.
    #[arg(long, env = "VERTEX_SA_PATH")]
    pub vertex_sa_path: Option<PathBuf>,

    /// Static Vertex token. Bypasses the token source; never expires.
    #[arg(long, env = "VERTEX_APIKEY", hide_env_values = true)]
    pub vertex_token: Option<String>,

    /// Project used when no credential names one.
    #[arg(long, env = "GOOGLE_CLOUD_PROJECT")]
    pub google_cloud_project: Option<String>,

    /// Refresh this many seconds before the token expires.
    #[arg(long, default_value_t = 300, env = "VERTEX_REFRESH_MARGIN_SECS")]
    pub refresh_margin_secs: u64,

    /// Never wait longer than this between refreshes.
    #[arg(long, default_value_t = 3300, env = "VERTEX_REFRESH_CEILING_SECS")]
    pub refresh_ceiling_secs: u64,

    /// Wait after a failed refresh.
    #[arg(long, default_value_t = 60, env = "VERTEX_REFRESH_RETRY_SECS")]
    pub refresh_retry_secs: u64,

    /// What to do with an expired token when refresh fails: serve or fail.
    #[arg(long, default_value = "serve", env = "VERTEX_STALE_POLICY")]
    pub stale_policy: StalePolicy,

    #[arg(long, default_value = "weaviate-mcp-http", env = "MCP_SERVER_NAME")]
    pub server_name: String,

    /// Instructions file. Defaults to `prompts/instructions.md` if present.
    #[arg(long, env = "MCP_PROMPT_FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Inline instructions, used when no file is readable.
    #[arg(long, env = "MCP_PROMPT")]
    pub prompt: Option<String>,

    /// Description file. Defaults to `prompts/description.txt` if present.
    #[arg(long, env = "MCP_DESCRIPTION_FILE")]
    pub description_file: Option<PathBuf>,

    #[arg(long, env = "MCP_DESCRIPTION")]
    pub description: Option<String>,

    /// Force every hybrid search onto this collection.
    #[arg(long, env = "WEAVIATE_PINNED_COLLECTION")]
    pub pinned_collection: Option<String>,
}

/// Parse a permissive boolean: `1`, `true`, `yes` (any case) are true.
pub fn parse_flag(s: &str) -> Result<bool, String> {
    Ok(matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

impl GatewayConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.weaviate_endpoint().is_none() {
            anyhow::bail!("--weaviate-url or --weaviate-cluster-url must be specified");
        }
        if self.refresh_ceiling_secs == 0 {
            anyhow::bail!("--refresh-ceiling-secs must be positive");
        }
        if self.refresh_retry_secs == 0 {
            anyhow::bail!("--refresh-retry-secs must be positive");
        }
        if self.vertex_token.as_deref().is_some_and(str::is_empty) {
            anyhow::bail!("--vertex-token must not be empty");
        }
        Ok(())
    }

    /// Weaviate base URL without a trailing slash. The cluster URL wins.
    pub fn weaviate_endpoint(&self) -> Option<String> {
        self.weaviate_cluster_url
            .as_deref()
            .or(self.weaviate_url.as_deref())
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| u.trim_end_matches('/').to_owned())
    }

    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn refresh_ceiling(&self) -> Duration {
        Duration::from_secs(self.refresh_ceiling_secs)
    }

    pub fn refresh_retry(&self) -> Duration {
        Duration::from_secs(self.refresh_retry_secs)
    }

    pub fn refresh_policy(&self) -> RefreshPolicy {
        RefreshPolicy {
            margin: self.refresh_margin(),
            ceiling: self.refresh_ceiling(),
            fallback: self.refresh_ceiling(),
            retry_backoff: self.refresh_retry(),
            stale: self.stale_policy,
            ..RefreshPolicy::default()
        }
    }

    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            inline_json: self.google_credentials_json.clone().filter(|s| !s.trim().is_empty()),
            credentials_path: self.google_credentials.clone(),
            sa_path: self.vertex_sa_path.clone(),
            discovery_paths: default_discovery_paths(),
            default_project: self.google_cloud_project.clone(),
        }
    }

    pub fn prompt_path(&self) -> PathBuf {
        self.prompt_file.clone().unwrap_or_else(|| PathBuf::from("prompts/instructions.md"))
    }

    pub fn description_path(&self) -> PathBuf {
        self.description_file.clone().unwrap_or_else(|| PathBuf::from("prompts/description.txt"))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
