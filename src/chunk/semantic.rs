//! Paragraph-based chunking.
//!
//! Paragraphs (blank-line separated) are packed greedily into a running
//! chunk. A chunk is emitted before a paragraph that would push it past
//! `max_chunk_size`, unless the running chunk is still shorter than
//! `min_chunk_size`; undersized chunks keep absorbing paragraphs instead.
//! Any packed chunk that ends up larger than `max_chunk_size` (a single
//! long paragraph, or over-filling) is re-split with a
//! [`FixedWindowChunker`] of `max_chunk_size` and 50 characters overlap.

use serde_json::json;

use super::{base_chunk_metadata, char_len, paragraphs, Chunker, FixedWindowChunker};
use crate::models::{fields, Metadata};

const RESPLIT_OVERLAP: usize = 50;

/// Paragraph-packing chunker.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    min_chunk_size: usize,
    max_chunk_size: usize,
}

impl SemanticChunker {
    pub fn new(min_chunk_size: usize, max_chunk_size: usize) -> Self {
        let max_chunk_size = max_chunk_size.max(1);
        Self {
            min_chunk_size: min_chunk_size.min(max_chunk_size),
            max_chunk_size,
        }
    }
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new(100, 1000)
    }
}

impl Chunker for SemanticChunker {
    fn name(&self) -> &str {
        "semantic"
    }

    fn chunk(&self, text: &str, _metadata: Option<&Metadata>) -> Vec<String> {
        let mut packed: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for para in paragraphs(text) {
            let para_len = char_len(para);

            if current.is_empty() {
                current.push_str(para);
                current_len = para_len;
                continue;
            }

            let would_be = current_len + 2 + para_len;
            if would_be > self.max_chunk_size && current_len >= self.min_chunk_size {
                packed.push(std::mem::take(&mut current));
                current.push_str(para);
                current_len = para_len;
            } else {
                current.push_str("\n\n");
                current.push_str(para);
                current_len = would_be;
            }
        }

        if !current.trim().is_empty() {
            packed.push(current);
        }

        let resplit = FixedWindowChunker::new(self.max_chunk_size, RESPLIT_OVERLAP);
        let chunks: Vec<String> = packed
            .into_iter()
            .flat_map(|chunk| {
                if char_len(&chunk) > self.max_chunk_size {
                    resplit.chunk(&chunk, None)
                } else {
                    vec![chunk]
                }
            })
            .collect();

        if chunks.is_empty() {
            vec![text.to_string()]
        } else {
            chunks
        }
    }

    fn chunk_metadata(
        &self,
        chunk: &str,
        index: usize,
        total: usize,
        base: &Metadata,
    ) -> Metadata {
        let mut meta = base_chunk_metadata(base, chunk, index, total, "semantic");
        meta.insert(
            fields::PARAGRAPH_COUNT.into(),
            json!(paragraphs(chunk).count()),
        );
        meta
    }
}
