//! Document-type adaptive chunking.
//!
//! [`DocumentTypeChunker`] holds one concrete strategy per [`ChunkProfile`]
//! and resolves the profile for each document:
//!
//! 1. An explicit `document_type` metadata field naming a known profile
//!    (`resume`/`cv`, `cover_letter`, `project`, `code`).
//! 2. Otherwise a substring match on the lowercased `filename`:
//!    `resume`/`cv` → resume, `cover`/`letter` → cover letter, a known code
//!    extension → code, `project` → project.
//! 3. Otherwise the default fixed window.
//!
//! Both chunking and metadata generation go through the resolved strategy,
//! and the chunk metadata is tagged with `adaptive_chunker_type`.

use std::collections::HashMap;

use serde_json::json;

use super::{Chunker, CodeAwareChunker, FixedWindowChunker, SemanticChunker};
use crate::models::{fields, meta_str, Metadata};

const CODE_EXTENSIONS: &[&str] = &[
    ".py", ".js", ".ts", ".java", ".cpp", ".c", ".h", ".cs", ".go", ".rb", ".php", ".rs",
];

/// Sub-strategy keys of the adaptive chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkProfile {
    Resume,
    CoverLetter,
    Project,
    Code,
    Default,
}

impl ChunkProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkProfile::Resume => "resume",
            ChunkProfile::CoverLetter => "cover_letter",
            ChunkProfile::Project => "project",
            ChunkProfile::Code => "code",
            ChunkProfile::Default => "default",
        }
    }

    fn from_document_type(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "resume" | "cv" => Some(ChunkProfile::Resume),
            "cover_letter" => Some(ChunkProfile::CoverLetter),
            "project" => Some(ChunkProfile::Project),
            "code" => Some(ChunkProfile::Code),
            _ => None,
        }
    }

    fn from_filename(filename: &str) -> Option<Self> {
        let name = filename.to_lowercase();
        if name.contains("resume") || name.contains("cv") {
            Some(ChunkProfile::Resume)
        } else if name.contains("cover") || name.contains("letter") {
            Some(ChunkProfile::CoverLetter)
        } else if CODE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            Some(ChunkProfile::Code)
        } else if name.contains("project") {
            Some(ChunkProfile::Project)
        } else {
            None
        }
    }

    /// Resolve the profile for a document from its metadata.
    pub fn resolve(metadata: Option<&Metadata>) -> Self {
        let Some(meta) = metadata else {
            return ChunkProfile::Default;
        };
        meta_str(meta, fields::DOCUMENT_TYPE)
            .and_then(Self::from_document_type)
            .or_else(|| meta_str(meta, fields::FILENAME).and_then(Self::from_filename))
            .unwrap_or(ChunkProfile::Default)
    }
}

/// Dispatcher that picks a chunking strategy per document.
pub struct DocumentTypeChunker {
    chunkers: HashMap<ChunkProfile, Box<dyn Chunker>>,
    fallback: Box<dyn Chunker>,
}

impl DocumentTypeChunker {
    /// Built-in profiles tuned for profile documents.
    pub fn new() -> Self {
        let mut chunkers: HashMap<ChunkProfile, Box<dyn Chunker>> = HashMap::new();
        chunkers.insert(ChunkProfile::Resume, Box::new(SemanticChunker::new(200, 800)));
        chunkers.insert(
            ChunkProfile::CoverLetter,
            Box::new(SemanticChunker::new(150, 600)),
        );
        chunkers.insert(ChunkProfile::Project, Box::new(FixedWindowChunker::new(600, 75)));
        chunkers.insert(ChunkProfile::Code, Box::new(CodeAwareChunker::default()));
        Self {
            chunkers,
            fallback: Box::new(FixedWindowChunker::default()),
        }
    }

    /// Replace the strategy used for one profile.
    pub fn with_profile(mut self, profile: ChunkProfile, chunker: Box<dyn Chunker>) -> Self {
        if profile == ChunkProfile::Default {
            self.fallback = chunker;
        } else {
            self.chunkers.insert(profile, chunker);
        }
        self
    }

    /// The strategy for `profile`, falling back to the default profile.
    pub fn strategy_for(&self, profile: ChunkProfile) -> &dyn Chunker {
        self.chunkers
            .get(&profile)
            .map(|c| c.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }
}

impl Default for DocumentTypeChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for DocumentTypeChunker {
    fn name(&self) -> &str {
        "document_type"
    }

    fn chunk(&self, text: &str, metadata: Option<&Metadata>) -> Vec<String> {
        let profile = ChunkProfile::resolve(metadata);
        self.strategy_for(profile).chunk(text, metadata)
    }

    fn chunk_metadata(
        &self,
        chunk: &str,
        index: usize,
        total: usize,
        base: &Metadata,
    ) -> Metadata {
        let profile = ChunkProfile::resolve(Some(base));
        let mut meta = self
            .strategy_for(profile)
            .chunk_metadata(chunk, index, total, base);
        meta.insert(fields::ADAPTIVE_CHUNKER_TYPE.into(), json!(profile.as_str()));
        meta
    }
}
