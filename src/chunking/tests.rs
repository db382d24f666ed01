use super::*;
use tempfile::TempDir;

const THREE_SECTIONS: &str = "Intro paragraph before any heading.

## Installation

Run the installer and follow the prompts.

## Configuration

Edit the configuration file to set the database URL.
";

fn small_chunker(max_chars: usize, overlap: usize) -> Chunker {
    Chunker::new(ChunkingConfig {
        max_chars,
        overlap,
        ..ChunkingConfig::default()
    })
}

#[test]
fn one_chunk_per_section_under_max_size() {
    let chunks = Chunker::default().chunk(THREE_SECTIONS, "guide.md");

    assert_eq!(chunks.len(), 3);
    let headings: Vec<&str> = chunks.iter().map(|c| c.metadata.heading.as_str()).collect();
    assert_eq!(headings, vec![PRELUDE_HEADING, "Installation", "Configuration"]);

    let indexes: Vec<usize> = chunks.iter().map(|c| c.metadata.index).collect();
    assert_eq!(indexes, vec![0, 1, 2]);

    assert!(chunks[1].content.starts_with("## Installation"));
    assert!(chunks.iter().all(|c| c.metadata.source == "guide.md"));
}

#[test]
fn chunk_content_is_trimmed() {
    let chunks = Chunker::default().chunk(THREE_SECTIONS, "guide.md");

    for chunk in &chunks {
        assert_eq!(chunk.content, chunk.content.trim());
        assert!(!chunk.content.is_empty());
    }
}

#[test]
fn document_starting_with_heading_has_no_prelude() {
    let text = "## Only\n\nBody text.";
    let chunks = Chunker::default().chunk(text, "only.md");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata.heading, "Only");
    assert_eq!(chunks[0].metadata.index, 0);
}

#[test]
fn whitespace_sections_produce_no_chunks() {
    let text = "   \n\n## Empty\n\n## Filled\n\nSomething here.";
    let chunks = Chunker::default().chunk(text, "sparse.md");

    // The "Empty" section still holds its heading line, so only the prelude vanishes
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content, "## Empty");
    assert_eq!(chunks[1].metadata.heading, "Filled");
    assert!(Chunker::default().chunk("  \n\t\n", "blank.md").is_empty());
}

#[test]
fn headings_inside_code_blocks_do_not_split() {
    let text = "## Shell\n\n```bash\n## not a heading\necho hi\n```\n";
    let chunks = Chunker::default().chunk(text, "shell.md");

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].content.contains("## not a heading"));
}

#[test]
fn other_heading_levels_stay_inside_section() {
    let text = "## Parent\n\n### Child\n\nDetails.";
    let chunks = Chunker::default().chunk(text, "levels.md");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata.heading, "Parent");
}

#[test]
fn front_matter_stays_in_prelude() {
    let text = "---\ntitle: Users\ndescription: Manage users\n---\n\n\
                Intro text here.\n\n## Create\n\nPOST to /users with a name.\n";
    let chunks = Chunker::default().chunk(text, "users.md");

    let headings: Vec<&str> = chunks.iter().map(|c| c.metadata.heading.as_str()).collect();
    assert_eq!(headings, vec![PRELUDE_HEADING, "Create"]);
    assert!(chunks[0].content.starts_with("---\ntitle: Users"));
    assert!(chunks[0].content.contains("description: Manage users"));
    assert!(chunks[0].content.ends_with("Intro text here."));
    assert!(chunks[1].content.starts_with("## Create"));
}

#[test]
fn underlined_headings_do_not_split() {
    let text = "## Setup\n\nFirst steps.\n\nAdvanced\n--------\n\nMore steps.\n\n\
                Closing note\n---\n";
    let chunks = Chunker::default().chunk(text, "setup.md");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].metadata.heading, "Setup");
    assert!(chunks[0].content.contains("Advanced\n--------"));
    assert!(chunks[0].content.ends_with("Closing note\n---"));
}

#[test]
fn oversized_section_uses_sliding_window() {
    let text = "abcdefghijklmnopqrstuvwxyz0123"; // 30 chars, no whitespace
    let chunks = small_chunker(10, 3).chunk(text, "long.md");

    let step = window_step(10, 3);
    assert_eq!(step, 7);

    let expected: Vec<String> = [0, 7, 14, 21]
        .iter()
        .map(|start: &usize| text.chars().skip(*start).take(10).collect())
        .collect();
    let contents: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    assert_eq!(contents, expected);

    // The last window ends at the end of the section, and only once
    let ending_at_end = chunks
        .iter()
        .filter(|c| text.ends_with(c.content.as_str()))
        .count();
    assert_eq!(ending_at_end, 1);
    assert!(chunks.iter().all(|c| c.content.chars().count() <= 10));
}

#[test]
fn window_that_exactly_reaches_end_stops_loop() {
    // 24 chars with step 7: windows start at 0, 7, 14 and the third ends at 24
    let text = "x".repeat(24);
    let chunks = small_chunker(10, 3).chunk(&text, "exact.md");

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[2].content.chars().count(), 10);
}

#[test]
fn index_continues_across_sections_after_windowing() {
    let text = format!("{}\n\n## Next\n\nShort.", "y".repeat(25));
    let chunks = small_chunker(10, 0).chunk(&text, "mixed.md");

    let indexes: Vec<usize> = chunks.iter().map(|c| c.metadata.index).collect();
    assert_eq!(indexes, (0..chunks.len()).collect::<Vec<_>>());
    // 25-char prelude gives three windows, the 15-char "Next" section two more
    assert_eq!(chunks.len(), 5);
    assert_eq!(chunks[2].metadata.heading, PRELUDE_HEADING);
    assert_eq!(chunks[3].metadata.heading, "Next");
    assert_eq!(chunks[4].content, "hort.");
}

#[test]
fn overlap_not_smaller_than_max_terminates() {
    assert_eq!(window_step(10, 10), 10);
    assert_eq!(window_step(10, 25), 10);
    assert_eq!(window_step(0, 0), 1);

    let text = "z".repeat(35);
    let chunks = small_chunker(10, 10).chunk(&text, "guard.md");
    assert_eq!(chunks.len(), 4);
}

#[test]
fn windows_respect_multibyte_characters() {
    let text = "é".repeat(15);
    let chunks = small_chunker(10, 2).chunk(&text, "accents.md");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].content.chars().count(), 10);
    assert_eq!(chunks[1].content.chars().count(), 7);
}

#[test]
fn chunk_ids_are_deterministic() {
    let first = Chunker::default().chunk(THREE_SECTIONS, "guide.md");
    let second = Chunker::default().chunk(THREE_SECTIONS, "guide.md");

    let first_ids: Vec<&str> = first.iter().map(|c| c.id.as_str()).collect();
    let second_ids: Vec<&str> = second.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(first_ids, second_ids);

    let ids: std::collections::HashSet<&str> = first_ids.iter().copied().collect();
    assert_eq!(ids.len(), first_ids.len());
}

#[test]
fn chunk_id_changes_with_every_component() {
    let base = chunk_id("a.md", "Intro", 0, "text");

    assert_eq!(base, chunk_id("a.md", "Intro", 0, "text"));
    assert_ne!(base, chunk_id("b.md", "Intro", 0, "text"));
    assert_ne!(base, chunk_id("a.md", "Outro", 0, "text"));
    assert_ne!(base, chunk_id("a.md", "Intro", 1, "text"));
    assert_ne!(base, chunk_id("a.md", "Intro", 0, "other text"));

    let parsed = Uuid::parse_str(&base).expect("chunk id should be a UUID");
    assert_eq!(parsed.get_version_num(), 5);
}

#[tokio::test]
async fn chunk_file_reads_from_disk() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("guide.md");
    std::fs::write(&path, THREE_SECTIONS).expect("should write test file");

    let chunks = Chunker::default()
        .chunk_file(&path, "guide.md")
        .await
        .expect("should chunk file");
    assert_eq!(chunks.len(), 3);

    let missing = Chunker::default()
        .chunk_file(&temp_dir.path().join("missing.md"), "missing.md")
        .await;
    assert!(missing.is_err());
}
