//! Capabilities injected into the agent, the pipeline and persistence.
//!
//! Real implementations live in `gitpulse-github`, `gitpulse-llm` and
//! `gitpulse-store`; tests use deterministic fakes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::RepoInfoResult;

/// Why a text generation call failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerateError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    /// Rate limits, 5xx responses, dropped connections.
    #[error("transient provider error: {0}")]
    Transient(String),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider returned no text")]
    Empty,
}

impl GenerateError {
    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GenerateError::Timeout(_) | GenerateError::Transient(_))
    }
}

/// `generate(prompt) -> text`
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, instructions: &str, prompt: &str) -> Result<String, GenerateError>;
}

/// Declaration of a tool the agent may call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

/// `callTool(name, args) -> result`
///
/// Failures are folded into the returned value (`{"ok": false, ...}`);
/// nothing thrown here may abort an agent turn.
#[async_trait::async_trait]
pub trait ToolInvoker: Send + Sync {
    fn tools(&self) -> Vec<ToolSpec>;
    async fn call_tool(&self, name: &str, args: Value) -> Value;
}

/// Fetch repository metadata, recent commits and top contributors.
#[async_trait::async_trait]
pub trait RepoSource: Send + Sync {
    async fn repository_info(&self, owner: &str, repo: &str) -> RepoInfoResult;
}

/// Store and retrieve a JSON blob by key.
///
/// `memorize` returns the store's raw acknowledgement; callers validate its shape.
#[async_trait::async_trait]
pub trait MemoryStore: Send + Sync {
    async fn memorize(&self, key: &str, data: &Value) -> anyhow::Result<Value>;
    async fn recall(&self, key: &str) -> anyhow::Result<Option<Value>>;
}
