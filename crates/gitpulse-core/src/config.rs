use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "gitpulse.json";

// ── Sections ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub token: Option<String>,
    /// Upper bound for one REST call, body included.
    pub timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

impl GithubConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API (`{base_url}/chat/completions`).
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound for a single generation call.
    pub stage_timeout_secs: u64,
    /// Total attempts per stage when the failure is retryable.
    pub max_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 90,
            max_attempts: 2,
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

// ── Top level ──

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GithubConfig,
    pub llm: LlmConfig,
    pub serve: ServeConfig,
    pub pipeline: PipelineConfig,
    pub output_dir: PathBuf,
    pub store_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github: GithubConfig::default(),
            llm: LlmConfig::default(),
            serve: ServeConfig::default(),
            pipeline: PipelineConfig::default(),
            output_dir: PathBuf::from("output"),
            store_dir: PathBuf::from(".gitpulse").join("memory"),
        }
    }
}

impl Config {
    /// Load from a JSON file. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config: {}", path.display()))?;
        Ok(config)
    }

    /// Load, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Secrets and endpoints from the environment win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("GITHUB_TOKEN").filter(|v| !v.is_empty()) {
            self.github.token = Some(v);
        }
        if let Some(v) = lookup("GITPULSE_LLM_API_KEY").filter(|v| !v.is_empty()) {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = lookup("GITPULSE_LLM_BASE_URL").filter(|v| !v.is_empty()) {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("GITPULSE_LLM_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = v;
        }
    }
}
