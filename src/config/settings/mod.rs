#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::answer::OverflowPolicy;
use crate::database::Similarity;
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::gemini::DEFAULT_EMBEDDING_DIMENSION;

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const STORE_URI_ENV: &str = "DOCS_QA_STORE_URI";
/// Cluster URI used by MongoDB Atlas deployments; LanceDB cannot open it
pub const LEGACY_STORE_URI_ENV: &str = "MONGODB_ATLAS_CLUSTER_URI";
pub const CONFIG_DIR_ENV: &str = "DOCS_QA_CONFIG_DIR";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: u32,
    pub batch_size: u32,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    /// Only ever read from the environment, never written to disk.
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            embedding_model: "embedding-001".to_string(),
            chat_model: "gemini-1.5-flash".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: 100,
            request_timeout_secs: 30,
            retry_attempts: 3,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// LanceDB connection URI. Defaults to `<base_dir>/vectors`.
    pub uri: Option<String>,
    pub index_name: String,
    pub similarity: Similarity,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: None,
            index_name: "coach-index-1".to_string(),
            similarity: Similarity::Cosine,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnswerConfig {
    pub max_context_tokens: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 30_000,
            overflow_policy: OverflowPolicy::Truncate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            allowed_origin: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound on each embedding, search and generation call.
    pub call_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { call_secs: 60 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 100)")]
    InvalidBatchSize(u32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidRequestTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid chunk size: {0} (must be between 50 and 8192)")]
    InvalidChunkSize(usize),
    #[error("Overlap ({0}) must be at most half of the chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid index name: {0:?} (letters, digits, '-', '_' and '.' only)")]
    InvalidIndexName(String),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid context limit: {0} (must be at least 256 tokens)")]
    InvalidContextLimit(usize),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("Invalid allowed origin: {0} (must be an http(s) origin)")]
    InvalidOrigin(String),
    #[error("Invalid call timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidCallTimeout(u64),
    #[error("{API_KEY_ENV} is not set")]
    MissingApiKey,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Load `config.toml` from `config_dir`, falling back to defaults when it does not exist.
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Load from the standard location and apply environment overrides.
    #[inline]
    pub fn load_from_env() -> Result<Self> {
        // A missing .env file is the normal case.
        dotenvy::dotenv().ok();

        let config_dir = Self::config_dir().context("Failed to resolve config directory")?;
        let mut config = Self::load(&config_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .with_context(|| "Configuration validation failed after environment overrides")?;
        Ok(config)
    }

    /// Resolve the configuration directory from `DOCS_QA_CONFIG_DIR` or the platform default.
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            if !dir.trim().is_empty() {
                return Ok(PathBuf::from(dir));
            }
        }

        dirs::config_dir()
            .map(|dir| dir.join("docs-qa"))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Apply overrides from an environment-like lookup.
    #[inline]
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.gemini.api_key = Some(key);
        }
        if let Some(uri) = lookup(STORE_URI_ENV).filter(|u| !u.trim().is_empty()) {
            self.store.uri = Some(uri);
        }
        if legacy_store_uri_ignored(&lookup) {
            warn!(
                "{} is set but ignored; set {} to choose the vector store location (using {})",
                LEGACY_STORE_URI_ENV,
                STORE_URI_ENV,
                self.store_uri()
            );
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// LanceDB URI for the vector store
    #[inline]
    pub fn store_uri(&self) -> String {
        self.store.uri.clone().unwrap_or_else(|| {
            self.get_base_dir()
                .join("vectors")
                .to_string_lossy()
                .into_owned()
        })
    }

    #[inline]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.call_secs)
    }

    #[inline]
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini
            .api_key
            .as_deref()
            .ok_or(ConfigError::MissingApiKey)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gemini.validate()?;
        self.validate_chunking_config()?;
        self.validate_store_config()?;

        if !(1..=100).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }

        if self.answer.max_context_tokens < 256 {
            return Err(ConfigError::InvalidContextLimit(
                self.answer.max_context_tokens,
            ));
        }

        self.server.validate()?;

        if !(1..=3600).contains(&self.timeouts.call_secs) {
            return Err(ConfigError::InvalidCallTimeout(self.timeouts.call_secs));
        }

        Ok(())
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(50..=8192).contains(&config.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(config.chunk_size));
        }

        if config.overlap * 2 > config.chunk_size {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.chunk_size,
            ));
        }

        Ok(())
    }

    fn validate_store_config(&self) -> Result<(), ConfigError> {
        let name = &self.store.index_name;
        let valid_chars = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if name.is_empty() || !valid_chars {
            return Err(ConfigError::InvalidIndexName(name.clone()));
        }

        Ok(())
    }
}

impl GeminiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_url()?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if self.batch_size == 0 || self.batch_size > 100 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.request_timeout_secs) {
            return Err(ConfigError::InvalidRequestTimeout(
                self.request_timeout_secs,
            ));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn api_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.base_url).map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))
    }
}

impl ServerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;

        let origin = Url::parse(&self.allowed_origin)
            .map_err(|_| ConfigError::InvalidOrigin(self.allowed_origin.clone()))?;
        if origin.scheme() != "http" && origin.scheme() != "https" {
            return Err(ConfigError::InvalidOrigin(self.allowed_origin.clone()));
        }

        Ok(())
    }

    #[inline]
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind.clone()))
    }
}

/// True when only the MongoDB cluster variable is set, so the store falls back
/// to the configured or default LanceDB location.
#[inline]
pub fn legacy_store_uri_ignored<F>(lookup: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let set = |name: &str| lookup(name).is_some_and(|value| !value.trim().is_empty());
    set(LEGACY_STORE_URI_ENV) && !set(STORE_URI_ENV)
}
