// Vector persistence and similarity search over indexed chunks

pub mod lance;
pub mod qdrant;


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

use crate::chunking::DocumentChunk;
use crate::config::{Config, ConfigError};
use crate::{RagError, Result};

pub use lance::LanceStore;
pub use qdrant::QdrantStore;

/// Language tag used when none is configured
pub const DEFAULT_LANG: &str = "en";

/// Data stored next to each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointPayload {
    pub text: String,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub lang: String,
    /// Whitespace-separated word count of `text`
    pub tokens: u32,
}

impl Default for PointPayload {
    #[inline]
    fn default() -> Self {
        Self {
            text: String::new(),
            source: String::new(),
            section: None,
            lang: DEFAULT_LANG.to_string(),
            tokens: 0,
        }
    }
}

/// A stored vector. Search results carry a `score` and usually no vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedPoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vector: Vec<f32>,
    pub payload: PointPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    /// Qdrant server reached over HTTP
    Qdrant,
    /// Embedded LanceDB tables under the configuration directory
    LanceDb,
}

impl fmt::Display for VectorBackend {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Qdrant => "qdrant",
            Self::LanceDb => "lancedb",
        })
    }
}

impl FromStr for VectorBackend {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "lancedb" => Ok(Self::LanceDb),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// The configured vector index
#[derive(Debug)]
pub enum VectorStore {
    Qdrant(QdrantStore),
    Lance(LanceStore),
}

impl VectorStore {
    /// Connect to the backend named in the configuration
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let dimension = config.ollama.embedding_dimension as usize;

        match config.vector_store.backend {
            VectorBackend::Qdrant => Ok(Self::Qdrant(QdrantStore::new(
                &config.vector_store,
                dimension,
            ))),
            VectorBackend::LanceDb => {
                let store = LanceStore::open(
                    &config.vector_database_path(),
                    &config.vector_store,
                    dimension,
                )
                .await?;
                Ok(Self::Lance(store))
            }
        }
    }

    #[inline]
    pub fn backend(&self) -> VectorBackend {
        match self {
            Self::Qdrant(_) => VectorBackend::Qdrant,
            Self::Lance(_) => VectorBackend::LanceDb,
        }
    }

    /// Length every stored vector must have
    #[inline]
    pub fn dimension(&self) -> usize {
        match self {
            Self::Qdrant(store) => store.dimension(),
            Self::Lance(store) => store.dimension(),
        }
    }

    /// Create the collection if it does not exist yet. Returns whether it was created.
    #[inline]
    pub async fn ensure_collection(&self) -> Result<bool> {
        match self {
            Self::Qdrant(store) => store.ensure_collection().await,
            Self::Lance(store) => store.ensure_collection().await,
        }
    }

    /// Insert or overwrite points by id
    #[inline]
    pub async fn add_documents(&self, points: &[IndexedPoint]) -> Result<()> {
        match self {
            Self::Qdrant(store) => store.add_documents(points).await,
            Self::Lance(store) => store.add_documents(points).await,
        }
    }

    /// Up to `top_k` points closest to `query_vector`, best first
    #[inline]
    pub async fn search(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<IndexedPoint>> {
        match self {
            Self::Qdrant(store) => store.search(query_vector, top_k).await,
            Self::Lance(store) => store.search(query_vector, top_k).await,
        }
    }

    /// The subset of `ids` already stored
    #[inline]
    pub async fn fetch_existing_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        match self {
            Self::Qdrant(store) => store.fetch_existing_ids(ids).await,
            Self::Lance(store) => store.fetch_existing_ids(ids).await,
        }
    }

    /// Delete every point in the collection
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        match self {
            Self::Qdrant(store) => store.clear().await,
            Self::Lance(store) => store.clear().await,
        }
    }

    #[inline]
    pub async fn count(&self) -> Result<u64> {
        match self {
            Self::Qdrant(store) => store.count().await,
            Self::Lance(store) => store.count().await,
        }
    }
}

/// Pair chunks with their vectors, by position
#[inline]
pub fn chunks_to_points(
    chunks: &[DocumentChunk],
    vectors: Vec<Vec<f32>>,
    lang: &str,
) -> Result<Vec<IndexedPoint>> {
    if chunks.len() != vectors.len() {
        return Err(RagError::vector_store(format!(
            "Got {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        )));
    }

    Ok(chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexedPoint {
            id: chunk.id.clone(),
            vector,
            payload: PointPayload {
                text: chunk.content.clone(),
                source: chunk.metadata.source.clone(),
                section: Some(chunk.metadata.heading.clone()),
                lang: lang.to_string(),
                tokens: token_count(&chunk.content),
            },
            score: None,
        })
        .collect())
}

/// Reject a batch before writing if any vector has the wrong length
#[inline]
pub fn validate_points(points: &[IndexedPoint], dimension: usize) -> Result<()> {
    if let Some(point) = points.iter().find(|p| p.vector.len() != dimension) {
        return Err(RagError::vector_store(format!(
            "Point {} has {} dimensions, collection expects {}",
            point.id,
            point.vector.len(),
            dimension
        )));
    }
    Ok(())
}

/// Ids are UUIDs of versions 1 to 5; anything else cannot be stored
#[inline]
pub fn is_valid_point_id(id: &str) -> bool {
    Uuid::parse_str(id).is_ok_and(|uuid| matches!(uuid.get_version_num(), 1..=5))
}

#[inline]
pub fn filter_valid_ids(ids: &[String]) -> Vec<String> {
    let valid: Vec<String> = ids
        .iter()
        .filter(|id| is_valid_point_id(id))
        .cloned()
        .collect();

    if valid.len() != ids.len() {
        debug!("Ignoring {} malformed point ids", ids.len() - valid.len());
    }
    valid
}

/// Whitespace-separated word count
#[inline]
pub fn token_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}
