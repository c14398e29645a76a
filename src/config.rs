use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use audit_assistant_core::planner::{DEFAULT_LIST_LIMIT, DEFAULT_SAMPLE_SIZE};
use audit_assistant_core::router::{DEFAULT_STRUCTURED_KEYWORDS, DEFAULT_UNSTRUCTURED_KEYWORDS};
use audit_assistant_core::search::DEFAULT_TOP_K;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlannerConfig {
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
            sample_size: default_sample_size(),
        }
    }
}

fn default_list_limit() -> usize {
    DEFAULT_LIST_LIMIT
}
fn default_sample_size() -> usize {
    DEFAULT_SAMPLE_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_structured_keywords")]
    pub structured_keywords: Vec<String>,
    #[serde(default = "default_unstructured_keywords")]
    pub unstructured_keywords: Vec<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            structured_keywords: default_structured_keywords(),
            unstructured_keywords: default_unstructured_keywords(),
        }
    }
}

fn default_structured_keywords() -> Vec<String> {
    DEFAULT_STRUCTURED_KEYWORDS.iter().map(|s| s.to_string()).collect()
}
fn default_unstructured_keywords() -> Vec<String> {
    DEFAULT_UNSTRUCTURED_KEYWORDS.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

pub const DEFAULT_EMBEDDING_DIMS: usize = 384;

impl EmbeddingConfig {
    pub fn dims_or_default(&self) -> usize {
        self.dims.unwrap_or(DEFAULT_EMBEDDING_DIMS)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. When the
    /// variable is unset or empty, answers use the canned strategy.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            model: default_llm_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_llm_retries(),
            temperature: default_temperature(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.deepseek.com".to_string()
}
fn default_llm_model() -> String {
    "deepseek-chat".to_string()
}
fn default_api_key_env() -> String {
    "DEEPSEEK_API_KEY".to_string()
}
fn default_llm_retries() -> u32 {
    2
}
fn default_temperature() -> f32 {
    0.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub invoices_csv: Option<PathBuf>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            invoices_csv: None,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_tokens() -> usize {
    250
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.ingest.max_tokens == 0 {
        anyhow::bail!("ingest.max_tokens must be > 0");
    }

    if config.planner.list_limit == 0 || config.planner.sample_size == 0 {
        anyhow::bail!("planner.list_limit and planner.sample_size must be >= 1");
    }

    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    match config.embedding.provider.as_str() {
        "hash" => {}
        "openai" | "ollama" | "local" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() {
                anyhow::bail!(
                    "embedding.dims must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }

    if config.llm.api_key_env.trim().is_empty() {
        anyhow::bail!("llm.api_key_env must name an environment variable");
    }

    Ok(())
}
