// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use weavegate_auth::CredentialManager;

use crate::config::GatewayConfig;
use crate::instructions::{InstructionSources, Instructions};
use crate::weaviate::WeaviateClient;

/// Shared gateway state.
pub struct GatewayState {
    pub config: GatewayConfig,
    pub credentials: Arc<CredentialManager>,
    pub weaviate: WeaviateClient,
    pub instructions: Instructions,
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(
        config: GatewayConfig,
        credentials: Arc<CredentialManager>,
        shutdown: CancellationToken,
    ) -> Self {
        let weaviate = WeaviateClient::new(
            config.weaviate_endpoint().unwrap_or_default(),
            config.weaviate_api_key.clone(),
            config.openai_api_key.clone(),
            Arc::clone(&credentials),
            config.refresh_margin(),
        );
        let instructions = Instructions::new(InstructionSources::from_config(&config));
        Self { config, credentials, weaviate, instructions, shutdown }
    }
}
