use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_window_chars")]
    pub window_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            window_chars: default_window_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_window_chars() -> usize {
    10_000
}
fn default_overlap_chars() -> usize {
    1_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Number of chunks handed to the generator per question.
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
    2
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_gen_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_gen_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gen_max_retries() -> u32 {
    2
}
fn default_gen_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    /// Character budget for the context handed to the generator. Oldest
    /// turns are evicted first once exceeded; retrieved chunks never are.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_context_chars: default_max_context_chars(),
        }
    }
}

fn default_max_context_chars() -> usize {
    24_000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.window_chars == 0 {
        anyhow::bail!("chunking.window_chars must be > 0");
    }
    if config.chunking.window_chars <= config.chunking.overlap_chars {
        anyhow::bail!(
            "chunking.window_chars ({}) must be greater than chunking.overlap_chars ({})",
            config.chunking.window_chars,
            config.chunking.overlap_chars
        );
    }

    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
    if config.embedding.model.is_none() {
        anyhow::bail!(
            "embedding.model must be specified for provider '{}'",
            config.embedding.provider
        );
    }
    if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
        anyhow::bail!(
            "embedding.dims must be > 0 for provider '{}'",
            config.embedding.provider
        );
    }

    match config.generation.provider.as_str() {
        "openai" | "ollama" => {}
        other => anyhow::bail!(
            "Unknown generation provider: '{}'. Must be openai or ollama.",
            other
        ),
    }
    if config.generation.model.is_none() {
        anyhow::bail!(
            "generation.model must be specified for provider '{}'",
            config.generation.provider
        );
    }

    if config.chat.max_context_chars == 0 {
        anyhow::bail!("chat.max_context_chars must be > 0");
    }

    Ok(())
}
