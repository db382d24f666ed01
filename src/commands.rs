use anyhow::{Context, Result};
use console::style;
use dialoguer::Confirm;
use itertools::Itertools;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, get_config_dir};
use crate::indexer::{Indexer, IndexingStats};
use crate::pipeline::{PipelineResult, QueryPipeline};
use crate::vector_store::{IndexedPoint, VectorStore};

/// Load the configuration from the default directory, with environment overrides
#[inline]
pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(&config_dir)
}

/// Index every Markdown file under `dir` and print a summary
#[inline]
pub async fn index_docs(config: &Config, dir: &Path) -> Result<IndexingStats> {
    info!("Indexing documentation under {}", dir.display());

    let indexer = Indexer::from_config(config)
        .await
        .context("Failed to initialize indexer")?;
    let stats = indexer
        .run(dir)
        .await
        .with_context(|| format!("Failed to index {}", dir.display()))?;

    println!("{}", render_stats(&stats));
    Ok(stats)
}

/// Answer a question, bounded by the configured pipeline timeout
#[inline]
pub async fn ask_question(config: &Config, question: &str, json: bool) -> Result<PipelineResult> {
    let pipeline = QueryPipeline::from_config(config)
        .await
        .context("Failed to initialize query pipeline")?;

    let limit = Duration::from_secs(config.pipeline.timeout_secs);
    let result = tokio::time::timeout(limit, pipeline.ask(question))
        .await
        .with_context(|| format!("No answer within {}s", limit.as_secs()))?
        .context("Failed to answer question")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render_answer(&result));
    }
    Ok(result)
}

/// Print the passages nearest to `query`, without reranking or generation
#[inline]
pub async fn search_docs(config: &Config, query: &str, top_k: Option<usize>) -> Result<()> {
    let pipeline = QueryPipeline::from_config(config)
        .await
        .context("Failed to initialize query pipeline")?;
    let top_k = top_k.unwrap_or_else(|| pipeline.top_k());

    let points = pipeline
        .search(query, top_k)
        .await
        .context("Failed to search the index")?;

    if points.is_empty() {
        println!("No matching passages. Has the documentation been indexed?");
        return Ok(());
    }

    println!("{}", render_search_results(&points));
    Ok(())
}

/// Delete every stored point, after confirmation unless `yes` is set
#[inline]
pub async fn clear_index(config: &Config, yes: bool) -> Result<()> {
    let store = VectorStore::from_config(config)
        .await
        .context("Failed to open vector store")?;
    let count = store.count().await.context("Failed to count points")?;

    if count == 0 {
        println!("The {} index is already empty.", store.backend());
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Delete all {} indexed chunks? This cannot be undone.",
                count
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Nothing deleted.");
            return Ok(());
        }
    }

    store.clear().await.context("Failed to clear the index")?;
    println!("{} Deleted {} chunks", style("✓").green(), count);
    Ok(())
}

#[inline]
pub fn render_stats(stats: &IndexingStats) -> String {
    let mut lines = vec![
        style("Indexing complete").bold().to_string(),
        format!("  Files processed: {}", stats.files_processed),
        format!("  Chunks generated: {}", stats.chunks_generated),
        format!("  Chunks indexed: {}", stats.chunks_indexed),
        format!("  Chunks skipped: {}", stats.chunks_skipped),
    ];
    if stats.chunks_too_short > 0 {
        lines.push(format!("  Chunks too short to embed: {}", stats.chunks_too_short));
    }
    if stats.files_failed > 0 {
        lines.push(format!("  Files failed: {}", style(stats.files_failed).red()));
    }
    if stats.chunks_failed > 0 {
        lines.push(format!("  Chunks failed: {}", style(stats.chunks_failed).red()));
    }
    lines.join("\n")
}

/// Answer text followed by a numbered list of the sources it used
#[inline]
pub fn render_answer(result: &PipelineResult) -> String {
    if result.sources.is_empty() {
        return result.answer.clone();
    }

    let sources = result
        .sources
        .iter()
        .enumerate()
        .map(|(i, point)| format!("  [{}] {}", i + 1, point_label(point)))
        .join("\n");

    format!("{}\n\n{}\n{}", result.answer, style("Sources:").bold(), sources)
}

#[inline]
pub fn render_search_results(points: &[IndexedPoint]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let score = point
                .score
                .map_or_else(|| "-".to_string(), |s| format!("{:.3}", s));
            format!(
                "{}. [{}] {}\n{}",
                i + 1,
                style(score).cyan(),
                point_label(point),
                point.payload.text
            )
        })
        .join("\n\n")
}

fn point_label(point: &IndexedPoint) -> String {
    match &point.payload.section {
        Some(section) if !section.is_empty() => {
            format!("{} > {}", point.payload.source, section)
        }
        _ => point.payload.source.clone(),
    }
}
