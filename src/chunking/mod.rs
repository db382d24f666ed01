#[cfg(test)]
mod tests;

use std::path::Path;

use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Namespace for chunk identifiers. Changing it invalidates every indexed point.
pub const CHUNK_ID_NAMESPACE: Uuid = Uuid::from_u128(0xb8a7_b6e2_1c2d_4e3f_9a4b_5c6d_7e8f_9a0b);

/// Heading given to text that appears before the first section heading
pub const PRELUDE_HEADING: &str = "Prelude";

/// A bounded piece of a document, identified by its content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Deterministic UUID v5, see [`chunk_id`]
    pub id: String,
    /// Trimmed, non-empty chunk text
    pub content: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Document label, usually the path relative to the indexed root
    pub source: String,
    /// Title of the section the chunk was cut from
    pub heading: String,
    /// Position of the chunk within its document, continuous across sections
    pub index: usize,
}

/// Configuration for document chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub max_chars: usize,
    /// Characters shared by consecutive windows of an oversized section
    pub overlap: usize,
    /// Heading level that opens a new section
    pub heading_level: u8,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chars: 1800,
            overlap: 200,
            heading_level: 2,
        }
    }
}

/// Derive the identifier of a chunk from its source, heading, index and content
#[inline]
pub fn chunk_id(source: &str, heading: &str, index: usize, content: &str) -> String {
    let key = format!("{}::{}::{}::{}", source, heading, index, content);
    Uuid::new_v5(&CHUNK_ID_NAMESPACE, key.as_bytes()).to_string()
}

/// Distance between the starts of two consecutive windows.
/// An overlap that would stall the window falls back to no overlap at all.
#[inline]
pub fn window_step(max_chars: usize, overlap: usize) -> usize {
    let max_chars = max_chars.max(1);
    if overlap >= max_chars {
        max_chars
    } else {
        max_chars - overlap
    }
}

/// Splits Markdown documents into heading sections and size-bounded chunks
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

struct Section<'a> {
    heading: String,
    text: &'a str,
}

impl Chunker {
    #[inline]
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    /// Read a Markdown file and chunk it under the given source label
    #[inline]
    pub async fn chunk_file(
        &self,
        path: &Path,
        source: &str,
    ) -> std::io::Result<Vec<DocumentChunk>> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(self.chunk(&text, source))
    }

    /// Chunk a document's text
    #[inline]
    pub fn chunk(&self, text: &str, source: &str) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();

        for section in split_sections(text, heading_level(self.config.heading_level)) {
            self.chunk_section(&section, source, &mut chunks);
        }

        debug!(
            "Chunked '{}' into {} chunks (max {} chars, overlap {})",
            source,
            chunks.len(),
            self.config.max_chars,
            self.config.overlap
        );

        chunks
    }

    fn chunk_section(&self, section: &Section<'_>, source: &str, chunks: &mut Vec<DocumentChunk>) {
        let clean = section.text.trim();
        if clean.is_empty() {
            return;
        }

        let max_chars = self.config.max_chars.max(1);
        let char_count = clean.chars().count();

        if char_count <= max_chars {
            chunks.push(create_chunk(clean, source, &section.heading, chunks.len()));
            return;
        }

        // Byte offset of every char position, plus the end of the text
        let offsets: Vec<usize> = clean
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(clean.len()))
            .collect();
        let step = window_step(max_chars, self.config.overlap);

        let mut start = 0;
        loop {
            let end = (start + max_chars).min(char_count);
            let window = clean
                .get(offsets[start]..offsets[end])
                .unwrap_or_default()
                .trim();

            if !window.is_empty() {
                chunks.push(create_chunk(window, source, &section.heading, chunks.len()));
            }

            if end == char_count {
                break;
            }
            start += step;
        }
    }
}

fn create_chunk(content: &str, source: &str, heading: &str, index: usize) -> DocumentChunk {
    DocumentChunk {
        id: chunk_id(source, heading, index, content),
        content: content.to_string(),
        metadata: ChunkMetadata {
            source: source.to_string(),
            heading: heading.to_string(),
            index,
        },
    }
}

fn heading_level(level: u8) -> HeadingLevel {
    match level {
        1 => HeadingLevel::H1,
        2 => HeadingLevel::H2,
        3 => HeadingLevel::H3,
        4 => HeadingLevel::H4,
        5 => HeadingLevel::H5,
        _ => HeadingLevel::H6,
    }
}

/// Cut the document at every heading of `level`. The heading line stays with
/// the section it opens; headings inside code blocks are not headings.
fn split_sections(text: &str, level: HeadingLevel) -> Vec<Section<'_>> {
    let mut boundaries: Vec<(usize, String)> = Vec::new();
    let mut open_heading: Option<(usize, String)> = None;

    // Front matter is parsed as a metadata block, never as a `---` rule or setext heading
    let parser = Parser::new_ext(text, Options::ENABLE_YAML_STYLE_METADATA_BLOCKS);

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(Tag::Heading { level: found, .. })
                if found == level && is_atx_heading(text, range.start) =>
            {
                open_heading = Some((range.start, String::new()));
            }
            Event::Text(fragment) | Event::Code(fragment) => {
                if let Some((_, title)) = open_heading.as_mut() {
                    title.push_str(&fragment);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some((_, title)) = open_heading.as_mut() {
                    title.push(' ');
                }
            }
            Event::End(TagEnd::Heading(found)) if found == level => {
                if let Some(boundary) = open_heading.take() {
                    boundaries.push(boundary);
                }
            }
            _ => {}
        }
    }

    let prelude_end = boundaries.first().map_or(text.len(), |(start, _)| *start);
    let mut sections = Vec::with_capacity(boundaries.len() + 1);
    sections.push(Section {
        heading: PRELUDE_HEADING.to_string(),
        text: text.get(..prelude_end).unwrap_or_default(),
    });

    for (i, (start, title)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map_or(text.len(), |(next_start, _)| *next_start);
        sections.push(Section {
            heading: title.trim().to_string(),
            text: text.get(*start..end).unwrap_or_default(),
        });
    }

    sections
}

/// Only `#`-prefixed headings open sections; underlined (setext) headings stay in place
fn is_atx_heading(text: &str, start: usize) -> bool {
    text.get(start..)
        .is_some_and(|rest| rest.trim_start_matches(' ').starts_with('#'))
}
