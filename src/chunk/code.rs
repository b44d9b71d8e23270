//! Code-aware chunking.
//!
//! Lines are accumulated in order. Once the running chunk would exceed
//! `max_chunk_size`, it is cut immediately before the next line that starts
//! a definition (function, class, or variable declaration). Lines between
//! definitions are never split apart, so a chunk may run over the limit
//! until the next definition boundary appears.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::{base_chunk_metadata, Chunker};
use crate::models::Metadata;

static DEFINITION_START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(def |async def |class |function |var |let |const |fn |pub fn |async fn |func |struct |impl )")
        .expect("valid definition regex")
});

static FUNCTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(async\s+)?(pub\s+)?(def|function|fn|func)\s")
        .expect("valid function regex")
});

static CLASS_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(class|struct)\s").expect("valid class regex"));

/// Chunker that only cuts at definition boundaries.
#[derive(Debug, Clone)]
pub struct CodeAwareChunker {
    max_chunk_size: usize,
}

impl CodeAwareChunker {
    pub fn new(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size: max_chunk_size.max(1),
        }
    }
}

impl Default for CodeAwareChunker {
    fn default() -> Self {
        Self::new(800)
    }
}

/// True if `line` opens a function, class, or variable declaration.
pub fn is_definition_line(line: &str) -> bool {
    DEFINITION_START.is_match(line)
}

impl Chunker for CodeAwareChunker {
    fn name(&self) -> &str {
        "code_aware"
    }

    fn chunk(&self, text: &str, _metadata: Option<&Metadata>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_size = 0usize;

        for line in text.split('\n') {
            // +1 for the newline that rejoins the lines
            let line_size = line.chars().count() + 1;

            if current_size + line_size > self.max_chunk_size
                && !current.is_empty()
                && is_definition_line(line)
            {
                chunks.push(current.join("\n"));
                current.clear();
                current_size = 0;
            }

            current.push(line);
            current_size += line_size;
        }

        if !current.is_empty() {
            chunks.push(current.join("\n"));
        }

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
        let mut meta = base_chunk_metadata(base, chunk, index, total, "code_aware");
        meta.insert(
            "function_count".into(),
            json!(FUNCTION_LINE.find_iter(chunk).count()),
        );
        meta.insert("class_count".into(), json!(CLASS_LINE.find_iter(chunk).count()));
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYTHON: &str = "import os\n\ndef alpha():\n    return 1\n\ndef beta():\n    return 2\n\nclass Gamma:\n    def method(self):\n        pass\n";

    #[test]
    fn test_definition_detection() {
        assert!(is_definition_line("def foo():"));
        assert!(is_definition_line("    def method(self):"));
        assert!(is_definition_line("class Foo:"));
        assert!(is_definition_line("const x = 1;"));
        assert!(is_definition_line("pub fn run() {"));
        assert!(!is_definition_line("return define"));
        assert!(!is_definition_line("# def in a comment"));
    }

    #[test]
    fn test_small_file_single_chunk() {
        let chunker = CodeAwareChunker::default();
        let chunks = chunker.chunk(PYTHON, None);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], PYTHON);
    }

    #[test]
    fn test_cuts_before_definitions() {
        let chunker = CodeAwareChunker::new(30);
        let chunks = chunker.chunk(PYTHON, None);
        assert!(chunks.len() > 1);
        for c in &chunks[1..] {
            let first = c.lines().next().unwrap();
            assert!(is_definition_line(first), "chunk starts with {:?}", first);
        }
        assert_eq!(chunks.join("\n"), PYTHON);
    }

    #[test]
    fn test_never_cuts_without_definition() {
        let body = "x = 1\n".repeat(100);
        let chunker = CodeAwareChunker::new(20);
        let chunks = chunker.chunk(&body, None);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_metadata_counts() {
        let chunker = CodeAwareChunker::default();
        let meta = chunker.chunk_metadata(PYTHON, 0, 1, &Metadata::new());
        assert_eq!(meta["function_count"], 3);
        assert_eq!(meta["class_count"], 1);
        assert_eq!(meta["chunker_type"], "code_aware");
    }
}
