// Indexer module
// Walks a documentation tree and stores embeddings for chunks not yet indexed


use std::path::{Path, PathBuf};

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::chunking::{Chunker, DocumentChunk};
use crate::config::Config;
use crate::embeddings::Embedder;
use crate::vector_store::{VectorStore, chunks_to_points};
use crate::{RagError, Result};

/// Counters for one indexing run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexingStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub chunks_generated: usize,
    pub vectors_generated: usize,
    pub chunks_skipped: usize,
    /// Chunks with too little text to embed; never stored, so every run counts them again
    pub chunks_too_short: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
}

/// Chunks, embeds and stores Markdown documents, skipping chunks whose id is
/// already present in the store
#[derive(Debug)]
pub struct Indexer {
    chunker: Chunker,
    embedder: Embedder,
    store: VectorStore,
    lang: String,
}

impl Indexer {
    #[inline]
    pub fn new(chunker: Chunker, embedder: Embedder, store: VectorStore, lang: impl Into<String>) -> Self {
        Self {
            chunker,
            embedder,
            store,
            lang: lang.into(),
        }
    }

    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = Embedder::from_config(config.ollama.index_embedder, &config.ollama)?;
        let store = VectorStore::from_config(config).await?;

        Ok(Self::new(
            Chunker::new(config.chunking.clone()),
            embedder,
            store,
            config.vector_store.lang.clone(),
        ))
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Index every Markdown file under `root`. Per-file failures are counted
    /// and logged; only failures that affect the whole run are returned.
    #[inline]
    pub async fn run(&self, root: &Path) -> Result<IndexingStats> {
        let files = discover_markdown_files(root).await?;
        info!("Found {} Markdown files under {}", files.len(), root.display());

        if self.store.ensure_collection().await? {
            info!("Created {} collection", self.store.backend());
        }

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(files.len() as u64).with_style(
                ProgressStyle::with_template("{bar:30} [{pos}/{len}] Indexing {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut stats = IndexingStats::default();
        for path in &files {
            let source = source_label(root, path);
            bar.set_message(source.clone());

            match self.index_file(path, &source, &mut stats).await {
                Ok(()) => stats.files_processed += 1,
                Err(e) => {
                    error!("Failed to index {}: {}", source, e);
                    stats.files_failed += 1;
                }
            }
            bar.inc(1);
        }
        bar.finish_and_clear();

        info!(
            "Indexing finished: {} files processed, {} failed; {} chunks ({} indexed, {} skipped, {} too short, {} failed), {} vectors generated",
            stats.files_processed,
            stats.files_failed,
            stats.chunks_generated,
            stats.chunks_indexed,
            stats.chunks_skipped,
            stats.chunks_too_short,
            stats.chunks_failed,
            stats.vectors_generated
        );

        Ok(stats)
    }

    /// Errors returned here fail the file; embedding and upsert failures only
    /// fail the affected chunks
    async fn index_file(&self, path: &Path, source: &str, stats: &mut IndexingStats) -> Result<()> {
        let chunks = self.chunker.chunk_file(path, source).await?;
        stats.chunks_generated += chunks.len();

        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let existing = self.store.fetch_existing_ids(&ids).await?;

        let (skipped, fresh): (Vec<DocumentChunk>, Vec<DocumentChunk>) =
            chunks.into_iter().partition(|c| existing.contains(&c.id));
        for chunk in &skipped {
            debug!("Skipping already indexed chunk {} of {}", chunk.metadata.index, source);
        }
        stats.chunks_skipped += skipped.len();

        let (fresh, too_short): (Vec<DocumentChunk>, Vec<DocumentChunk>) = fresh
            .into_iter()
            .partition(|c| self.embedder.is_embeddable(&c.content));
        for chunk in &too_short {
            debug!("Chunk {} of {} is too short to embed", chunk.metadata.index, source);
        }
        stats.chunks_too_short += too_short.len();

        if fresh.is_empty() {
            return Ok(());
        }

        let results = join_all(fresh.iter().map(|chunk| self.embedder.embed(&chunk.content))).await;

        let mut embedded = Vec::with_capacity(fresh.len());
        let mut vectors = Vec::with_capacity(fresh.len());
        for (chunk, result) in fresh.into_iter().zip(results) {
            match result {
                Ok(vector) => {
                    embedded.push(chunk);
                    vectors.push(vector);
                }
                Err(e) => {
                    warn!("Failed to embed chunk {} of {}: {}", chunk.metadata.index, source, e);
                    stats.chunks_failed += 1;
                }
            }
        }
        stats.vectors_generated += vectors.len();

        if embedded.is_empty() {
            return Ok(());
        }

        match self.store_chunks(&embedded, vectors).await {
            Ok(()) => {
                debug!("Stored {} chunks of {}", embedded.len(), source);
                stats.chunks_indexed += embedded.len();
            }
            Err(e) => {
                warn!("Failed to store {} chunks of {}: {}", embedded.len(), source, e);
                stats.chunks_failed += embedded.len();
            }
        }

        Ok(())
    }

    async fn store_chunks(&self, chunks: &[DocumentChunk], vectors: Vec<Vec<f32>>) -> Result<()> {
        let points = chunks_to_points(chunks, vectors, &self.lang)?;
        self.store.add_documents(&points).await
    }
}

/// All `.md` files below `root` (extension compared case-insensitively), sorted
#[inline]
pub async fn discover_markdown_files(root: &Path) -> Result<Vec<PathBuf>> {
    let metadata = tokio::fs::metadata(root).await?;
    if !metadata.is_dir() {
        return Err(RagError::Config(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;

            if file_type.is_dir() {
                pending.push(path);
            } else if is_markdown(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Path of `path` relative to `root`, `/`-separated on every platform
#[inline]
pub fn source_label(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .join("/")
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
}
