// Text embedding through Ollama, with optional cleanup of documentation markup

pub mod ollama;


use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;

use crate::config::{ConfigError, OllamaConfig};
use crate::http::run_blocking;
use crate::{RagError, Result};

pub use ollama::OllamaClient;

/// Shortest text, after preparation, that is worth embedding
pub const MIN_EMBEDDING_TEXT_CHARS: usize = 10;

/// Markup removed by the cleaning embedder, applied in order.
/// Block shortcodes go before inline ones, which would otherwise eat their opening tag.
static CLEANUP_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^\s*---\r?\n[\s\S]*?\r?\n---[^\S\r\n]*(?:\r?\n|$)").expect("valid regex"),
        Regex::new(r"::[\w-]+\{[^}]*\}[\s\S]*?::").expect("valid regex"),
        Regex::new(r":[\w-]+\{[^}]*\}").expect("valid regex"),
    ]
});

/// How text is prepared before it is sent to the embedding model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Text is embedded as-is
    Generic,
    /// Front matter and shortcodes are stripped first
    Cleaning,
}

impl fmt::Display for EmbedderKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Generic => "generic",
            Self::Cleaning => "cleaning",
        })
    }
}

impl FromStr for EmbedderKind {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "generic" => Ok(Self::Generic),
            "cleaning" => Ok(Self::Cleaning),
            _ => Err(ConfigError::UnknownEmbedder(s.to_string())),
        }
    }
}

/// Maps text to vectors with one embedding model
#[derive(Debug, Clone)]
pub struct Embedder {
    kind: EmbedderKind,
    client: OllamaClient,
    model: String,
    normalize: bool,
}

impl Embedder {
    #[inline]
    pub fn new(kind: EmbedderKind, client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            kind,
            client,
            model: model.into(),
            normalize: false,
        }
    }

    /// Embedder of the given kind using the configured embedding model
    #[inline]
    pub fn from_config(kind: EmbedderKind, config: &OllamaConfig) -> Result<Self> {
        let client = OllamaClient::new(config)?;
        Ok(Self::new(kind, client, config.embedding_model.clone())
            .with_normalization(config.normalize_embeddings))
    }

    /// Scale every returned vector to unit length
    #[inline]
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    #[inline]
    pub fn kind(&self) -> EmbedderKind {
        self.kind
    }

    /// Text that would be sent to the model, or an error if too little remains.
    /// The generic kind sends the text unchanged.
    #[inline]
    pub fn prepare(&self, text: &str) -> Result<String> {
        let prepared = match self.kind {
            EmbedderKind::Generic => text.to_string(),
            EmbedderKind::Cleaning => clean_text(text),
        };

        let length = prepared.trim().chars().count();
        if length < MIN_EMBEDDING_TEXT_CHARS {
            return Err(RagError::Embedding(format!(
                "Text too short to embed ({} chars, need at least {})",
                length, MIN_EMBEDDING_TEXT_CHARS
            )));
        }

        Ok(prepared)
    }

    /// Whether `prepare` would accept the text
    #[inline]
    pub fn is_embeddable(&self, text: &str) -> bool {
        self.prepare(text).is_ok()
    }

    #[inline]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let prompt = self.prepare(text)?;
        let client = self.client.clone();
        let model = self.model.clone();

        let vector = run_blocking(move || client.embedding(&model, &prompt)).await?;
        debug!("{} embedder produced {} dimensions", self.kind, vector.len());

        Ok(if self.normalize {
            normalize_vector(&vector)
        } else {
            vector
        })
    }
}

/// Strip front matter and shortcodes, then trim
#[inline]
pub fn clean_text(text: &str) -> String {
    CLEANUP_PATTERNS
        .iter()
        .fold(text.to_string(), |acc, regex| {
            regex.replace_all(&acc, "").to_string()
        })
        .trim()
        .to_string()
}

/// Scale a vector to unit Euclidean length. All-zero vectors come back unchanged.
#[inline]
pub fn normalize_vector(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}
