// Cross-encoder reranking of retrieved passages through a generation endpoint

#[cfg(test)]
mod tests;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embeddings::ollama::{GenerateRequest, OllamaClient};
use crate::http::run_blocking;
use crate::{RagError, Result};

const SCORE_CHARS: &str = "+-0123456789.eE";

/// A passage with the relevance score the rerank model gave it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RerankedCandidate {
    pub chunk: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct Reranker {
    client: OllamaClient,
    model: String,
    concurrency: usize,
}

impl Reranker {
    /// `concurrency` bounds the scoring calls in flight; 1 scores pairs one at a time
    #[inline]
    pub fn new(client: OllamaClient, model: impl Into<String>, concurrency: usize) -> Self {
        Self {
            client,
            model: model.into(),
            concurrency: concurrency.max(1),
        }
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OllamaClient::new(&config.ollama)?;
        Ok(Self::new(
            client,
            config.ollama.rerank_model.clone(),
            config.pipeline.rerank_concurrency,
        ))
    }

    /// Score every passage against `query` and return them best first.
    /// Equal scores keep their input order; one failed pair fails the whole call.
    #[inline]
    pub async fn rerank(&self, query: &str, passages: &[String]) -> Result<Vec<RerankedCandidate>> {
        if passages.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Reranking {} passages with {} (concurrency {})",
            passages.len(),
            self.model,
            self.concurrency
        );

        let scores: Vec<f32> = stream::iter(passages)
            .map(|passage| self.score_pair(query, passage))
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut candidates: Vec<RerankedCandidate> = passages
            .iter()
            .zip(scores)
            .map(|(chunk, score)| RerankedCandidate {
                chunk: chunk.clone(),
                score,
            })
            .collect();
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        Ok(candidates)
    }

    async fn score_pair(&self, query: &str, passage: &str) -> Result<f32> {
        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: serde_json::json!({ "query": query, "passage": passage }).to_string(),
            stream: false,
            temperature: 0.0,
            stop: None,
            max_tokens: None,
        };

        let client = self.client.clone();
        let response = run_blocking(move || client.generate(&request))
            .await
            .map_err(|e| {
                warn!("Rerank call failed: {}", e);
                RagError::Rerank(e.to_string())
            })?;

        Ok(parse_score(response.any_text()))
    }
}

/// Read the leading number of a model reply, or 0.0 when there is none
#[inline]
pub fn parse_score(text: &str) -> f32 {
    let text = text.trim_start();
    let prefix_len = text
        .char_indices()
        .find(|(_, c)| !SCORE_CHARS.contains(*c))
        .map_or(text.len(), |(offset, _)| offset);
    let prefix = text.get(..prefix_len).unwrap_or_default();

    // Longest prefix that parses, so "0.8." or "1e" still yield a number
    (1..=prefix.len())
        .rev()
        .find_map(|end| prefix.get(..end)?.parse::<f32>().ok())
        .filter(|score| score.is_finite())
        .unwrap_or(0.0)
}
