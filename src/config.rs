//! TOML configuration.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below, so `Config::default()` is a valid configuration.
//!
//! ```toml
//! [storage]
//! repo_dir = "./data/repos"
//! db_path = "./data/scout.sqlite"
//!
//! [chunking]
//! chunk_size = 1500
//! chunk_overlap = 200
//! max_file_size_kb = 500
//!
//! [cache]
//! ttl_hours = 24
//! clone_timeout_secs = 300
//!
//! [embedding]
//! provider = "hash"
//! ```

use anyhow::{Context, Result};
use scout_core::chunk::ChunkParams;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// One working tree per repository identity lives under here.
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,
    /// SQLite file holding every repository index.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            repo_dir: default_repo_dir(),
            db_path: default_db_path(),
        }
    }
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from("./data/repos")
}
fn default_db_path() -> PathBuf {
    PathBuf::from("./data/scout.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_file_size_kb")]
    pub max_file_size_kb: u64,
    /// File extensions (without the dot) eligible for indexing. Empty
    /// means every non-binary file.
    #[serde(default = "default_include_extensions")]
    pub include_extensions: Vec<String>,
    /// Extra globs, relative to the tree root, to leave out.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_file_size_kb: default_max_file_size_kb(),
            include_extensions: default_include_extensions(),
            exclude_globs: Vec::new(),
        }
    }
}

impl ChunkingConfig {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

fn default_chunk_size() -> usize {
    1500
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_max_file_size_kb() -> u64 {
    500
}
fn default_include_extensions() -> Vec<String> {
    [
        "py", "js", "ts", "jsx", "tsx", "java", "kt", "go", "rs", "c", "cpp", "h", "rb", "php",
        "swift", "scala", "sql", "graphql", "yaml", "yml", "json", "toml", "md", "rst", "txt",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// One hundred years.
pub const MAX_TTL_HOURS: u64 = 24 * 365 * 100;

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_clone_timeout_secs")]
    pub clone_timeout_secs: u64,
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_shallow_clone")]
    pub shallow_clone: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            clone_timeout_secs: default_clone_timeout_secs(),
            build_timeout_secs: default_build_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
            shallow_clone: default_shallow_clone(),
        }
    }
}

impl CacheConfig {
    /// Clamped to [`MAX_TTL_HOURS`].
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours.min(MAX_TTL_HOURS) as i64)
    }
    pub fn clone_timeout(&self) -> Duration {
        Duration::from_secs(self.clone_timeout_secs)
    }
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

fn default_ttl_hours() -> u64 {
    24
}
fn default_clone_timeout_secs() -> u64 {
    300
}
fn default_build_timeout_secs() -> u64 {
    1800
}
fn default_query_timeout_secs() -> u64 {
    120
}
fn default_shallow_clone() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `hash`, `local`, `openai`, or `ollama`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub max_input_chars: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            device: default_device(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
            max_input_chars: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_device() -> String {
    "cpu".to_string()
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
    "127.0.0.1:7341".to_string()
}

/// Read, parse, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if config.chunking.max_file_size_kb == 0 {
        anyhow::bail!("chunking.max_file_size_kb must be > 0");
    }

    let cache = &config.cache;
    if cache.ttl_hours == 0 || cache.ttl_hours > MAX_TTL_HOURS {
        anyhow::bail!("cache.ttl_hours must be between 1 and {MAX_TTL_HOURS}");
    }
    if cache.clone_timeout_secs == 0 || cache.build_timeout_secs == 0 || cache.query_timeout_secs == 0
    {
        anyhow::bail!("cache timeouts must be > 0");
    }

    let embedding = &config.embedding;
    if embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    match embedding.provider.as_str() {
        "hash" | "local" => {}
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.is_none() {
                anyhow::bail!(
                    "embedding.dims must be specified when provider is '{}'",
                    embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, local, openai, or ollama.",
            other
        ),
    }
    if embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    Ok(())
}
