// Question answering: retrieve, rerank, ground and generate

#[cfg(test)]
mod tests;

use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

use crate::Result;
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::generation::{
    GenerationOptions, Generator, NO_INFORMATION_ANSWER, OFF_TOPIC_ANSWER, PromptContext,
    Safeguard, build_prompt,
};
use crate::rerank::{RerankedCandidate, Reranker};
use crate::vector_store::{IndexedPoint, VectorStore};

/// Stage of a query, as reported in logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStep {
    Checking,
    Sourcing,
    Optimizing,
    Reading,
    Thinking,
}

impl fmt::Display for PipelineStep {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Checking => "checking",
            Self::Sourcing => "sourcing",
            Self::Optimizing => "optimizing",
            Self::Reading => "reading",
            Self::Thinking => "thinking",
        })
    }
}

/// Final answer to one question and the points it was grounded on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub answer: String,
    pub sources: Vec<IndexedPoint>,
}

impl PipelineResult {
    fn without_sources(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct QueryPipeline {
    embedder: Embedder,
    store: VectorStore,
    reranker: Reranker,
    generator: Generator,
    safeguard: Option<Safeguard>,
    generation_model: String,
    top_k: usize,
    temperature: f32,
}

impl QueryPipeline {
    /// Wire every component from configuration; the safeguard only when enabled
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = Embedder::from_config(config.ollama.query_embedder, &config.ollama)?;
        let store = VectorStore::from_config(config).await?;
        let safeguard = if config.pipeline.safeguard {
            Some(Safeguard::from_config(config)?)
        } else {
            None
        };

        Ok(Self {
            embedder,
            store,
            reranker: Reranker::from_config(config)?,
            generator: Generator::from_config(config)?,
            safeguard,
            generation_model: config.ollama.generation_model.clone(),
            top_k: config.pipeline.top_k,
            temperature: config.pipeline.temperature,
        })
    }

    #[inline]
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Answer `question` from the indexed documentation
    #[inline]
    pub async fn ask(&self, question: &str) -> Result<PipelineResult> {
        if let Some(safeguard) = &self.safeguard {
            debug!("{}", PipelineStep::Checking);
            if !safeguard.is_relevant(question).await? {
                return Ok(PipelineResult::without_sources(OFF_TOPIC_ANSWER));
            }
        }

        let candidates = self.search(question, self.top_k).await?;
        if candidates.is_empty() {
            info!("No indexed passage matched the question");
            return Ok(PipelineResult::without_sources(NO_INFORMATION_ANSWER));
        }

        debug!("{}: {} candidates", PipelineStep::Optimizing, candidates.len());
        let texts: Vec<String> = candidates.iter().map(|p| p.payload.text.clone()).collect();
        let mut reranked = self.reranker.rerank(question, &texts).await?;
        reranked.truncate(self.top_k);

        debug!("{}", PipelineStep::Reading);
        let sources = select_sources(&reranked, &candidates);
        let contexts: Vec<PromptContext> = sources.iter().map(to_context).collect();
        if contexts.is_empty() {
            return Ok(PipelineResult::without_sources(NO_INFORMATION_ANSWER));
        }
        let prompt = build_prompt(question, &contexts);

        debug!(
            "{}: {} sources, model {}",
            PipelineStep::Thinking,
            sources.len(),
            self.generation_model
        );
        let answer = self
            .generator
            .generate(
                &prompt,
                &self.generation_model,
                &GenerationOptions::with_temperature(self.temperature),
            )
            .await?;

        Ok(PipelineResult { answer, sources })
    }

    /// Nearest stored points for `question`, best first
    #[inline]
    pub async fn search(&self, question: &str, top_k: usize) -> Result<Vec<IndexedPoint>> {
        debug!("{}: top {}", PipelineStep::Sourcing, top_k);
        let vector = self.embedder.embed(question).await?;
        self.store.search(&vector, top_k).await
    }
}

/// Map reranked passages back to the candidates they came from.
/// The first candidate with identical text wins; passages matching none are dropped.
#[inline]
pub fn select_sources(
    reranked: &[RerankedCandidate],
    candidates: &[IndexedPoint],
) -> Vec<IndexedPoint> {
    reranked
        .iter()
        .filter_map(|ranked| {
            let found = candidates.iter().find(|p| p.payload.text == ranked.chunk);
            if found.is_none() {
                debug!("Reranked passage matches no candidate, dropping it");
            }
            found.cloned()
        })
        .collect()
}

fn to_context(point: &IndexedPoint) -> PromptContext {
    PromptContext {
        text: point.payload.text.clone(),
        source: point.payload.source.clone(),
        section: point.payload.section.clone(),
    }
}
