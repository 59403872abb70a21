// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server instructions and description, loaded from a file or an inline value.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::GatewayConfig;

/// Where the instruction texts come from.
#[derive(Debug, Clone)]
pub struct InstructionSources {
    pub server_name: String,
    /// Configured file, or the default location when it exists.
    pub prompt_file: Option<PathBuf>,
    pub prompt_inline: Option<String>,
    pub description_file: Option<PathBuf>,
    pub description_inline: Option<String>,
    default_prompt: PathBuf,
    default_description: PathBuf,
}

impl InstructionSources {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            server_name: config.server_name.clone(),
            prompt_file: config.prompt_file.clone(),
            prompt_inline: config.prompt.clone(),
            description_file: config.description_file.clone(),
            description_inline: config.description.clone(),
            default_prompt: config.prompt_path(),
            default_description: config.description_path(),
        }
    }

    fn resolved_prompt_file(&self) -> Option<PathBuf> {
        self.prompt_file.clone().or_else(|| existing(&self.default_prompt))
    }

    fn resolved_description_file(&self) -> Option<PathBuf> {
        self.description_file.clone().or_else(|| existing(&self.default_description))
    }
}

fn existing(path: &Path) -> Option<PathBuf> {
    path.exists().then(|| path.to_owned())
}

/// Current instruction texts as returned by `get_instructions`.
#[derive(Debug, Clone, Serialize)]
pub struct InstructionSnapshot {
    pub instructions: Option<String>,
    pub description: Option<String>,
    pub server_name: String,
    pub prompt_file: Option<PathBuf>,
    pub description_file: Option<PathBuf>,
}

/// Reloadable holder for the instruction texts.
pub struct Instructions {
    sources: InstructionSources,
    current: RwLock<InstructionSnapshot>,
}

impl Instructions {
    pub fn new(sources: InstructionSources) -> Self {
        let current = RwLock::new(load(&sources));
        Self { sources, current }
    }

    pub async fn snapshot(&self) -> InstructionSnapshot {
        self.current.read().await.clone()
    }

    /// Re-read both sources and swap in the result.
    pub async fn reload(&self) -> InstructionSnapshot {
        let fresh = load(&self.sources);
        *self.current.write().await = fresh.clone();
        tracing::info!(
            instructions = fresh.instructions.is_some(),
            description = fresh.description.is_some(),
            "instructions reloaded"
        );
        fresh
    }
}

fn load(sources: &InstructionSources) -> InstructionSnapshot {
    let prompt_file = sources.resolved_prompt_file();
    let description_file = sources.resolved_description_file();
    InstructionSnapshot {
        instructions: load_text(prompt_file.as_deref(), sources.prompt_inline.as_deref()),
        description: load_text(description_file.as_deref(), sources.description_inline.as_deref()),
        server_name: sources.server_name.clone(),
        prompt_file,
        description_file,
    }
}

/// A readable file wins; otherwise the non-empty inline value.
fn load_text(path: Option<&Path>, inline: Option<&str>) -> Option<String> {
    if let Some(path) = path.filter(|p| p.exists()) {
        match std::fs::read_to_string(path) {
            Ok(text) => return Some(text.trim().to_owned()),
            Err(e) => {
                tracing::warn!(path = %path.display(), err = %e, "cannot read instructions file");
            }
        }
    }
    inline.map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned)
}

#[cfg(test)]
#[path = "instructions_tests.rs"]
mod tests;
