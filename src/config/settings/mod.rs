
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::embeddings::EmbedderKind;
use crate::vector_store::VectorBackend;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Connection and model settings for the Ollama server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub embedding_model: String,
    pub generation_model: String,
    pub safeguard_model: String,
    pub rerank_model: String,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
    /// Text preparation applied to chunks before they are embedded
    pub index_embedder: EmbedderKind,
    /// Text preparation applied to questions before they are embedded
    pub query_embedder: EmbedderKind,
    pub normalize_embeddings: bool,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            embedding_model: "bge-m3".to_string(),
            generation_model: "dolphin3".to_string(),
            safeguard_model: "llama3:latest".to_string(),
            rerank_model: "qllama/bge-reranker-v2-m3".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 120,
            index_embedder: EmbedderKind::Generic,
            query_embedder: EmbedderKind::Cleaning,
            normalize_embeddings: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub backend: VectorBackend,
    /// Base URL of the Qdrant server, unused by the embedded backend
    pub url: String,
    pub collection: String,
    /// Minimum similarity for search hits; zero or less disables the floor
    pub score_threshold: f32,
    pub timeout_secs: u64,
    /// Language tag stored with every indexed point
    pub lang: String,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Qdrant,
            url: "http://localhost:6333".to_string(),
            collection: "docs_chunks".to_string(),
            score_threshold: 0.75,
            timeout_secs: 30,
            lang: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub top_k: usize,
    pub temperature: f32,
    pub rerank_concurrency: usize,
    /// Ask the safeguard model whether a question is on topic before answering
    pub safeguard: bool,
    /// Product the documentation covers, used by the safeguard prompt
    pub product_name: String,
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            temperature: 0.2,
            rerank_concurrency: 1,
            safeguard: false,
            product_name: "Directus".to_string(),
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 3600 seconds)")]
    InvalidTimeout(u64),
    #[error("Unknown embedder: {0} (must be 'generic' or 'cleaning')")]
    UnknownEmbedder(String),
    #[error("Unknown vector backend: {0} (must be 'qdrant' or 'lancedb')")]
    UnknownBackend(String),
    #[error("Invalid collection name: {0:?} (cannot be empty)")]
    InvalidCollection(String),
    #[error("Invalid score threshold: {0} (must not exceed 1.0)")]
    InvalidScoreThreshold(f32),
    #[error("Invalid max chunk size: {0} (must be between 100 and 8192)")]
    InvalidMaxChars(usize),
    #[error("Overlap ({0}) must be smaller than max chunk size ({1})")]
    OverlapTooLarge(usize, usize),
    #[error("Invalid heading level: {0} (must be between 1 and 6)")]
    InvalidHeadingLevel(u8),
    #[error("Invalid top_k: {0} (must be between 1 and 100)")]
    InvalidTopK(usize),
    #[error("Invalid temperature: {0} (must be between 0.0 and 2.0)")]
    InvalidTemperature(f32),
    #[error("Invalid rerank concurrency: {0} (must be between 1 and 32)")]
    InvalidRerankConcurrency(usize),
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnvValue { name: &'static str, value: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Directory holding the configuration file and the embedded vector database
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".docs-rag"))
            .or_else(|| dirs::data_dir().map(|data| data.join("docs-rag")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load the configuration file from `config_dir`, apply environment
    /// overrides, then validate the result
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::load_file(config_dir)?;

        config
            .apply_env_overrides(|name| std::env::var(name).ok())
            .context("Invalid environment override")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    /// Load the configuration file alone. A missing file yields the defaults.
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref();
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.to_path_buf();

        Ok(config)
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

    /// Override file values with the environment variables that are set.
    /// `lookup` abstracts the environment so callers can inject their own.
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VECTOR_BACKEND") {
            self.vector_store.backend = value.parse()?;
        }
        if let Some(value) = lookup("VECTORSTORE_URL") {
            self.vector_store.url = value;
        }
        if let Some(value) = lookup("VECTOR_COLLECTION_NAME") {
            self.vector_store.collection = value;
        }
        if let Some(value) = lookup("OLLAMA_URL") {
            self.ollama.set_base_url(&value)?;
        }
        if let Some(value) = lookup("OLLAMA_EMBED_MODEL") {
            self.ollama.embedding_model = value;
        }
        if let Some(value) = lookup("RAG_LLM_GENERATION_MODEL") {
            self.ollama.generation_model = value;
        }
        if let Some(value) = lookup("RAG_LLM_SAFEGUARD_MODEL") {
            self.ollama.safeguard_model = value;
        }
        if let Some(value) = lookup("RAG_RERANK_MODEL") {
            self.ollama.rerank_model = value;
        }
        if let Some(value) = lookup("RAG_TOP_K") {
            self.pipeline.top_k = parse_env("RAG_TOP_K", value)?;
        }
        if let Some(value) = lookup("RAG_TEMPERATURE") {
            self.pipeline.temperature = parse_env("RAG_TEMPERATURE", value)?;
        }

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.validate_vector_store_config()?;
        self.validate_chunking_config()?;
        self.validate_pipeline_config()?;
        Ok(())
    }

    fn validate_vector_store_config(&self) -> Result<(), ConfigError> {
        let config = &self.vector_store;

        if config.backend == VectorBackend::Qdrant {
            let url = Url::parse(&config.url)
                .map_err(|_| ConfigError::InvalidUrl(config.url.clone()))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(ConfigError::InvalidUrl(config.url.clone()));
            }
        }

        if config.collection.trim().is_empty() {
            return Err(ConfigError::InvalidCollection(config.collection.clone()));
        }

        if config.score_threshold.is_nan() || config.score_threshold > 1.0 {
            return Err(ConfigError::InvalidScoreThreshold(config.score_threshold));
        }

        validate_timeout(config.timeout_secs)
    }

    fn validate_chunking_config(&self) -> Result<(), ConfigError> {
        let config = &self.chunking;

        if !(100..=8192).contains(&config.max_chars) {
            return Err(ConfigError::InvalidMaxChars(config.max_chars));
        }

        if config.overlap >= config.max_chars {
            return Err(ConfigError::OverlapTooLarge(
                config.overlap,
                config.max_chars,
            ));
        }

        if !(1..=6).contains(&config.heading_level) {
            return Err(ConfigError::InvalidHeadingLevel(config.heading_level));
        }

        Ok(())
    }

    fn validate_pipeline_config(&self) -> Result<(), ConfigError> {
        let config = &self.pipeline;

        if !(1..=100).contains(&config.top_k) {
            return Err(ConfigError::InvalidTopK(config.top_k));
        }

        if !(0.0..=2.0).contains(&config.temperature) {
            return Err(ConfigError::InvalidTemperature(config.temperature));
        }

        if !(1..=32).contains(&config.rerank_concurrency) {
            return Err(ConfigError::InvalidRerankConcurrency(
                config.rerank_concurrency,
            ));
        }

        if config.safeguard && config.product_name.trim().is_empty() {
            return Err(ConfigError::InvalidModel(config.product_name.clone()));
        }

        validate_timeout(config.timeout_secs)
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Directory of the embedded LanceDB database
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for model in [
            &self.embedding_model,
            &self.generation_model,
            &self.safeguard_model,
            &self.rerank_model,
        ] {
            if model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(model.clone()));
            }
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        validate_timeout(self.timeout_secs)
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    /// Split a base URL such as `http://ollama:11434` into protocol, host and port
    pub fn set_base_url(&mut self, base_url: &str) -> Result<(), ConfigError> {
        let url = Url::parse(base_url).map_err(|_| ConfigError::InvalidUrl(base_url.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl(base_url.to_string()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConfigError::InvalidUrl(base_url.to_string()))?;

        self.set_protocol(url.scheme().to_string())?;
        self.host = host.to_string();
        self.set_port(port)?;
        Ok(())
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let candidate = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        candidate.ollama_url()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        self.embedding_model = non_empty_model(model)?;
        Ok(())
    }

    pub fn set_generation_model(&mut self, model: String) -> Result<(), ConfigError> {
        self.generation_model = non_empty_model(model)?;
        Ok(())
    }

    pub fn set_rerank_model(&mut self, model: String) -> Result<(), ConfigError> {
        self.rerank_model = non_empty_model(model)?;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

fn non_empty_model(model: String) -> Result<String, ConfigError> {
    if model.trim().is_empty() {
        Err(ConfigError::InvalidModel(model))
    } else {
        Ok(model)
    }
}

fn validate_timeout(timeout_secs: u64) -> Result<(), ConfigError> {
    if (1..=3600).contains(&timeout_secs) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTimeout(timeout_secs))
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnvValue { name, value })
}
