use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error ({}): {message}", status_label(.status.as_ref()))]
    VectorStore {
        status: Option<u16>,
        message: String,
    },

    #[error("Rerank error: {0}")]
    Rerank(String),

    #[error("Generation error ({}): {body}", status_label(.status.as_ref()))]
    Generation { status: Option<u16>, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Vector store failure that never reached a backend response
    #[inline]
    pub fn vector_store(message: impl Into<String>) -> Self {
        Self::VectorStore {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP status reported by the backend, if the failure carried one
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::VectorStore { status, .. } | Self::Generation { status, .. } => *status,
            _ => None,
        }
    }
}

fn status_label(status: Option<&u16>) -> String {
    status.map_or_else(|| "no response".to_string(), |code| format!("HTTP {}", code))
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
mod http;
pub mod indexer;
pub mod pipeline;
pub mod rerank;
pub mod vector_store;
