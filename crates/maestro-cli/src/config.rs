use anyhow::Context;
use maestro_orchestrator::{default_workers, OrchestratorConfig, Worker, WorkerRole};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which HTTP API the reasoning oracle speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Messages API.
    Claude,
    /// OpenAI-compatible chat completions.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: LlmProvider,
    pub model_id: String,
    /// Literal key, or `env:NAME` to read it from the environment.
    pub api_key: String,
    pub api_base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    2048
}

impl ModelConfig {
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                LlmProvider::Claude => "https://api.anthropic.com",
                LlmProvider::OpenAi => "https://api.openai.com",
            }
        }
    }

    /// The API key with any `env:` indirection resolved.
    pub fn resolved_api_key(&self) -> anyhow::Result<String> {
        match self.api_key.strip_prefix("env:") {
            Some(var) => std::env::var(var.trim())
                .with_context(|| format!("environment variable '{}' is not set", var.trim())),
            None => Ok(self.api_key.clone()),
        }
    }
}

/// Settings for the local action executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// File actions are confined to this directory.
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Search endpoint queried with `?q=<query>`. Web search fails when unset.
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default = "default_code_timeout")]
    pub code_timeout_secs: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace_root(),
            search_url: None,
            code_timeout_secs: default_code_timeout(),
            http_timeout_secs: default_http_timeout(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from("./workspace")
}

fn default_code_timeout() -> u64 {
    30
}

fn default_http_timeout() -> u64 {
    60
}

/// One `[[workers]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub id: String,
    pub role: WorkerRole,
    pub capabilities: Vec<String>,
    #[serde(default = "default_max_load")]
    pub max_load: u32,
}

fn default_max_load() -> u32 {
    1
}

impl From<WorkerConfig> for Worker {
    fn from(config: WorkerConfig) -> Self {
        Worker::new(config.id, config.role, config.capabilities, config.max_load)
    }
}

/// Contents of `maestro.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct MaestroConfig {
    pub model: ModelConfig,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl MaestroConfig {
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let config: MaestroConfig = toml::from_str(raw)?;
        if config.model.model_id.trim().is_empty() {
            anyhow::bail!("model.model_id must not be empty");
        }
        Ok(config)
    }

    /// Configured workers, or the default pool when none are listed.
    pub fn worker_pool(&self) -> Vec<Worker> {
        if self.workers.is_empty() {
            default_workers()
        } else {
            self.workers.iter().cloned().map(Worker::from).collect()
        }
    }
}
