//! Fixed-window chunking with word-boundary snapping and overlap.
//!
//! # Algorithm
//!
//! 1. Text no longer than `chunk_size` characters is returned as one chunk.
//! 2. A window of `chunk_size` characters starts at `start`. Unless the
//!    window already reaches the end of the text, its right edge is pulled
//!    back to the last space inside the window (never to `start` itself).
//! 3. The next window starts `overlap` characters before the previous
//!    right edge, moved forward to the start of a word so the re-read tail
//!    never begins mid-word. The re-read tail is therefore at most
//!    `overlap` characters.
//! 4. The loop ends once a window reaches the end of the text.
//!
//! A window always advances, so the loop terminates even when `overlap`
//! is larger than the distance to the previous word boundary.

use std::ops::Range;

use super::{base_chunk_metadata, Chunker};
use crate::models::Metadata;

/// Sliding-window chunker measured in characters.
#[derive(Debug, Clone)]
pub struct FixedWindowChunker {
    chunk_size: usize,
    overlap: usize,
}

impl FixedWindowChunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Character ranges of each window over `chars`.
    pub fn spans(&self, chars: &[char]) -> Vec<Range<usize>> {
        let len = chars.len();
        if len <= self.chunk_size {
            return vec![0..len];
        }

        let mut spans = Vec::new();
        let mut start = 0;

        while start < len {
            let mut end = (start + self.chunk_size).min(len);

            if end < len {
                if let Some(space) = (start + 1..end).rev().find(|&i| chars[i] == ' ') {
                    end = space;
                }
            }

            spans.push(start..end);

            if end >= len {
                break;
            }

            let mut next = end.saturating_sub(self.overlap);
            if next > start && next < end && !chars[next - 1].is_whitespace() {
                next = (next..=end)
                    .find(|&i| chars[i] == ' ')
                    .map(|i| i + 1)
                    .unwrap_or(end);
            }
            if next <= start {
                next = end;
            }
            start = next;
        }

        spans
    }
}

impl Default for FixedWindowChunker {
    fn default() -> Self {
        Self::new(500, 50)
    }
}

impl Chunker for FixedWindowChunker {
    fn name(&self) -> &str {
        "default"
    }

    fn chunk(&self, text: &str, _metadata: Option<&Metadata>) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let chunks: Vec<String> = self
            .spans(&chars)
            .into_iter()
            .map(|r| chars[r].iter().collect::<String>())
            .filter_map(|piece| {
                let trimmed = piece.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
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
        base_chunk_metadata(base, chunk, index, total, "default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_text(target: usize) -> String {
        let words = [
            "designed", "shipped", "a", "distributed", "ingestion", "service", "for", "resumes",
            "and", "led", "migration", "to", "async", "storage",
        ];
        let mut out = String::new();
        let mut i = 0;
        while out.chars().count() < target {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(words[i % words.len()]);
            i += 1;
        }
        out.chars().take(target).collect()
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunker = FixedWindowChunker::new(500, 50);
        let chunks = chunker.chunk("Hello, world!", None);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_exact_chunk_size_single_chunk() {
        let chunker = FixedWindowChunker::new(10, 2);
        assert_eq!(chunker.chunk("abcdefghij", None).len(), 1);
    }

    #[test]
    fn test_1200_chars_yields_three_chunks() {
        let text = sample_text(1200);
        assert_eq!(text.chars().count(), 1200);
        let chunker = FixedWindowChunker::default();
        let chunks = chunker.chunk(&text, None);
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert!(c.chars().count() <= 500, "chunk too long: {}", c.len());
        }
    }

    #[test]
    fn test_boundaries_fall_on_spaces() {
        let text = sample_text(1500);
        let chars: Vec<char> = text.chars().collect();
        let chunker = FixedWindowChunker::new(200, 30);
        let spans = chunker.spans(&chars);
        for span in &spans[..spans.len() - 1] {
            assert_eq!(chars[span.end], ' ', "boundary at {} is not a space", span.end);
        }
    }

    #[test]
    fn test_spans_reconstruct_text() {
        let text = sample_text(2345);
        let chars: Vec<char> = text.chars().collect();
        let chunker = FixedWindowChunker::new(300, 40);
        let spans = chunker.spans(&chars);

        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, chars.len());

        let mut rebuilt: String = chars[spans[0].clone()].iter().collect();
        for pair in spans.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            assert!(next.start > prev.start, "window did not advance");
            assert!(next.start <= prev.end + 1);
            assert!(prev.end.saturating_sub(next.start) <= 40, "overlap exceeds limit");
            let fresh_from = prev.end.max(next.start);
            rebuilt.extend(chars[prev.end..fresh_from].iter());
            rebuilt.extend(chars[fresh_from..next.end].iter());
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_overlap_starts_on_word() {
        let text = sample_text(1000);
        let chars: Vec<char> = text.chars().collect();
        let chunker = FixedWindowChunker::new(250, 50);
        let spans = chunker.spans(&chars);
        for span in &spans[1..] {
            assert!(
                chars[span.start - 1].is_whitespace(),
                "window starts mid-word at {}",
                span.start
            );
        }
    }

    #[test]
    fn test_no_spaces_hard_cut() {
        let text = "x".repeat(1050);
        let chunker = FixedWindowChunker::new(500, 50);
        let chunks = chunker.chunk(&text, None);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 500));
    }

    #[test]
    fn test_overlap_larger_than_chunk_terminates() {
        let text = sample_text(400);
        let chunker = FixedWindowChunker::new(20, 100);
        let chunks = chunker.chunk(&text, None);
        assert!(!chunks.is_empty());
        assert!(chunks.len() < 400);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "café résumé naïve ".repeat(60);
        let chunker = FixedWindowChunker::new(100, 10);
        let chunks = chunker.chunk(&text, None);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn test_metadata_tag() {
        let chunker = FixedWindowChunker::default();
        let meta = chunker.chunk_metadata("abc", 0, 1, &Metadata::new());
        assert_eq!(meta["chunker_type"], "default");
        assert_eq!(meta["chunk_size"], 3);
    }
}
