//! Pluggable text chunking.
//!
//! A [`Chunker`] splits raw document text into ordered chunk strings and
//! annotates each chunk with metadata. Five strategies are provided:
//!
//! | Strategy | Type | Boundary |
//! |----------|------|----------|
//! | Fixed window | [`FixedWindowChunker`] | `chunk_size` chars, word-snapped, with overlap |
//! | Semantic | [`SemanticChunker`] | blank-line paragraphs packed between min/max |
//! | Code aware | [`CodeAwareChunker`] | definition lines once `max_chunk_size` is reached |
//! | Type adaptive | [`DocumentTypeChunker`] | delegates by `document_type` / filename |
//! | Custom | [`CustomChunker`] | user-supplied functions |
//!
//! # Guarantees
//!
//! - `chunk` never returns an empty list for non-blank input: when no
//!   boundary is found the whole text becomes one chunk.
//! - Chunk order follows the source text.
//! - `chunk_metadata` always merges the base (document-level) metadata with
//!   `chunk_index`, `chunk_count`, and a `chunker_type` tag.
//!
//! All sizes are measured in characters, not bytes.

pub mod adaptive;
pub mod code;
pub mod custom;
pub mod fixed;
pub mod semantic;

pub use adaptive::{ChunkProfile, DocumentTypeChunker};
pub use code::CodeAwareChunker;
pub use custom::CustomChunker;
pub use fixed::FixedWindowChunker;
pub use semantic::SemanticChunker;

use anyhow::{bail, Result};
use serde_json::json;

use crate::config::ChunkingConfig;
use crate::models::{fields, Metadata};

/// A text segmentation strategy.
///
/// Implementations are pure: the same text and metadata always produce the
/// same chunks, which keeps chunk ids stable across re-runs.
pub trait Chunker: Send + Sync {
    /// Short identifier recorded in collection stats (e.g. `"semantic"`).
    fn name(&self) -> &str;

    /// Split `text` into ordered chunks.
    ///
    /// `metadata` is the document-level metadata; strategies may use it to
    /// pick a sub-strategy but must not require it.
    fn chunk(&self, text: &str, metadata: Option<&Metadata>) -> Vec<String>;

    /// Build the metadata stored alongside chunk `index` of `total`.
    fn chunk_metadata(&self, chunk: &str, index: usize, total: usize, base: &Metadata)
        -> Metadata;
}

/// Base metadata plus the fields every strategy records.
pub(crate) fn base_chunk_metadata(
    base: &Metadata,
    chunk: &str,
    index: usize,
    total: usize,
    chunker_type: &str,
) -> Metadata {
    let mut meta = base.clone();
    meta.insert(fields::CHUNK_INDEX.into(), json!(index));
    meta.insert(fields::CHUNK_COUNT.into(), json!(total));
    meta.insert(fields::CHUNK_SIZE.into(), json!(char_len(chunk)));
    meta.insert(fields::CHUNKER_TYPE.into(), json!(chunker_type));
    meta
}

/// Length in characters.
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Non-blank paragraphs separated by blank lines, trimmed.
pub(crate) fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n").map(str::trim).filter(|p| !p.is_empty())
}

/// Build the chunker selected by `chunking.strategy`.
///
/// | Value | Chunker |
/// |-------|---------|
/// | `"default"` | [`FixedWindowChunker`] with `chunk_size`/`overlap` |
/// | `"semantic"` | [`SemanticChunker`] with `min_chunk_size`/`max_chunk_size` |
/// | `"code"` | [`CodeAwareChunker`] with `code_max_chunk_size` |
/// | `"document_type"` | [`DocumentTypeChunker`] with built-in profiles |
/// | `"resume_sections"` | [`CustomChunker::resume_sections`] |
/// | `"project_descriptions"` | [`CustomChunker::project_descriptions`] |
pub fn create_chunker(config: &ChunkingConfig) -> Result<Box<dyn Chunker>> {
    create_chunker_named(&config.strategy, config)
}

/// Like [`create_chunker`], with the strategy name overridden (CLI `--chunker`).
pub fn create_chunker_named(name: &str, config: &ChunkingConfig) -> Result<Box<dyn Chunker>> {
    Ok(match name {
        "default" | "fixed" => Box::new(FixedWindowChunker::new(config.chunk_size, config.overlap)),
        "semantic" => Box::new(SemanticChunker::new(
            config.min_chunk_size,
            config.max_chunk_size,
        )),
        "code" => Box::new(CodeAwareChunker::new(config.code_max_chunk_size)),
        "document_type" | "adaptive" => Box::new(DocumentTypeChunker::new()),
        "resume_sections" => Box::new(CustomChunker::resume_sections()),
        "project_descriptions" => Box::new(CustomChunker::project_descriptions()),
        other => bail!(
            "Unknown chunker: '{}'. Use default, semantic, code, document_type, resume_sections, or project_descriptions.",
            other
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_metadata_merges_and_tags() {
        let mut base = Metadata::new();
        base.insert("filename".into(), json!("notes.txt"));
        let meta = base_chunk_metadata(&base, "héllo", 2, 5, "default");
        assert_eq!(meta["filename"], json!("notes.txt"));
        assert_eq!(meta["chunk_index"], json!(2));
        assert_eq!(meta["chunk_count"], json!(5));
        assert_eq!(meta["chunk_size"], json!(5));
        assert_eq!(meta["chunker_type"], json!("default"));
    }

    #[test]
    fn test_paragraphs_skip_blank() {
        let paras: Vec<&str> = paragraphs("one\n\n \n\n two \n\nthree").collect();
        assert_eq!(paras, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_create_chunker_by_name() {
        let config = ChunkingConfig::default();
        for (name, expected) in [
            ("default", "default"),
            ("semantic", "semantic"),
            ("code", "code_aware"),
            ("document_type", "document_type"),
            ("resume_sections", "custom_resume"),
        ] {
            let chunker = create_chunker_named(name, &config).unwrap();
            assert_eq!(chunker.name(), expected);
        }
        assert!(create_chunker_named("nope", &config).is_err());
    }
}
