//! User-defined chunking plus two presets for profile documents.
//!
//! A [`CustomChunker`] is assembled from a chunk function and a metadata
//! function. Either may be left out, in which case a 500/50
//! [`FixedWindowChunker`] and plain `custom`-tagged metadata are used.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::json;

use super::{base_chunk_metadata, char_len, paragraphs, Chunker, FixedWindowChunker};
use crate::models::Metadata;

pub type ChunkFn = Box<dyn Fn(&str, Option<&Metadata>) -> Vec<String> + Send + Sync>;
pub type MetadataFn = Box<dyn Fn(&str, usize, usize, &Metadata) -> Metadata + Send + Sync>;

const SECTION_KEYWORDS: &[&str] = &[
    "experience",
    "education",
    "skills",
    "projects",
    "summary",
    "objective",
    "awards",
    "certifications",
];

const MAX_HEADER_LEN: usize = 60;
const PROJECT_PIECE_MAX: usize = 800;

const TECHNOLOGIES: &[&str] = &[
    "rust", "python", "javascript", "typescript", "java", "c++", "c#", "kotlin", "swift",
    "react", "vue", "angular", "node.js", "django", "flask", "fastapi", "docker",
    "kubernetes", "aws", "gcp", "azure", "postgresql", "mysql", "sqlite", "mongodb", "redis",
    "graphql", "kafka", "tensorflow", "pytorch", "terraform", "linux",
];

static PROJECT_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(#{1,6}\s+\S|\*\*[^*]+\*\*:?\s*$|[Pp]roject\s+\d+\s*:|\d+\.\s+\S)")
        .expect("valid project boundary regex")
});

static METRIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(\.\d+)?\s*%|\$\s?\d|\b\d+(\.\d+)?x\b|\b\d[\d,]*\s*(users|customers|requests|ms|hours|days)\b)")
        .expect("valid metric regex")
});

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s)\]>"']+"#).expect("valid url regex"));

/// Chunker driven by caller-supplied functions.
pub struct CustomChunker {
    name: String,
    chunk_fn: ChunkFn,
    metadata_fn: MetadataFn,
}

impl CustomChunker {
    pub fn new() -> Self {
        let fallback = FixedWindowChunker::default();
        Self {
            name: "custom".to_string(),
            chunk_fn: Box::new(move |text, meta| fallback.chunk(text, meta)),
            metadata_fn: Box::new(|chunk, index, total, base| {
                base_chunk_metadata(base, chunk, index, total, "custom")
            }),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_chunk_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, Option<&Metadata>) -> Vec<String> + Send + Sync + 'static,
    {
        self.chunk_fn = Box::new(f);
        self
    }

    pub fn with_metadata_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, usize, usize, &Metadata) -> Metadata + Send + Sync + 'static,
    {
        self.metadata_fn = Box::new(f);
        self
    }

    /// Splits a resume at its section headers.
    pub fn resume_sections() -> Self {
        Self::new()
            .with_name("custom_resume")
            .with_chunk_fn(|text, _| split_resume_sections(text))
            .with_metadata_fn(|chunk, index, total, base| {
                let mut meta = base_chunk_metadata(base, chunk, index, total, "custom_resume");
                let section = section_type(chunk.lines().next().unwrap_or_default());
                if section == "skills" {
                    meta.insert("extracted_skills".into(), json!(extract_skills(chunk)));
                }
                meta.insert("section_type".into(), json!(section));
                meta
            })
    }

    /// Splits a portfolio into one piece per project entry.
    pub fn project_descriptions() -> Self {
        Self::new()
            .with_name("custom_code_project")
            .with_chunk_fn(|text, _| split_projects(text))
            .with_metadata_fn(|chunk, index, total, base| {
                let mut meta =
                    base_chunk_metadata(base, chunk, index, total, "custom_code_project");
                meta.insert("technologies".into(), json!(technologies(chunk)));
                meta.insert("has_metrics".into(), json!(METRIC.is_match(chunk)));
                let urls: Vec<&str> = URL.find_iter(chunk).map(|m| m.as_str()).collect();
                meta.insert("urls".into(), json!(urls));
                meta
            })
    }
}

impl Default for CustomChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for CustomChunker {
    fn name(&self) -> &str {
        &self.name
    }

    fn chunk(&self, text: &str, metadata: Option<&Metadata>) -> Vec<String> {
        (self.chunk_fn)(text, metadata)
    }

    fn chunk_metadata(
        &self,
        chunk: &str,
        index: usize,
        total: usize,
        base: &Metadata,
    ) -> Metadata {
        (self.metadata_fn)(chunk, index, total, base)
    }
}

/// A short line in all caps, or one naming a common resume section.
pub fn is_section_header(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() || char_len(line) > MAX_HEADER_LEN || line.ends_with('.') {
        return false;
    }
    let has_letters = line.chars().any(|c| c.is_alphabetic());
    let all_caps = has_letters && line == line.to_uppercase();
    if all_caps && char_len(line) > 3 {
        return true;
    }
    let lower = line.to_lowercase();
    SECTION_KEYWORDS.iter().any(|k| lower.contains(k))
}

fn section_type(header: &str) -> &'static str {
    let lower = header.to_lowercase();
    SECTION_KEYWORDS
        .iter()
        .find(|k| lower.contains(*k))
        .copied()
        .unwrap_or("general")
}

fn split_resume_sections(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_section_header(line) && current.iter().any(|l| !l.trim().is_empty()) {
            sections.push(current.join("\n").trim().to_string());
            current.clear();
        }
        current.push(line);
    }
    let tail = current.join("\n");
    if !tail.trim().is_empty() {
        sections.push(tail.trim().to_string());
    }

    if sections.is_empty() {
        vec![text.to_string()]
    } else {
        sections
    }
}

fn extract_skills(chunk: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut skills = Vec::new();
    for line in chunk.lines().skip(1) {
        for token in line.split(|c: char| !(c.is_alphanumeric() || "+#.".contains(c))) {
            let token = token.trim_matches('.');
            let capitalised = token.chars().next().is_some_and(|c| c.is_uppercase());
            if capitalised && char_len(token) > 2 && seen.insert(token.to_string()) {
                skills.push(token.to_string());
            }
        }
    }
    skills
}

fn split_projects(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if PROJECT_BOUNDARY.is_match(line) && current.iter().any(|l| !l.trim().is_empty()) {
            pieces.push(current.join("\n"));
            current.clear();
        }
        current.push(line);
    }
    pieces.push(current.join("\n"));

    let chunks: Vec<String> = pieces
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .flat_map(cap_piece)
        .collect();

    if chunks.is_empty() {
        vec![text.to_string()]
    } else {
        chunks
    }
}

/// Pack paragraphs of an oversized piece into chunks of at most 800 chars.
fn cap_piece(piece: &str) -> Vec<String> {
    if char_len(piece) <= PROJECT_PIECE_MAX {
        return vec![piece.to_string()];
    }

    let window = FixedWindowChunker::new(PROJECT_PIECE_MAX, 50);
    let mut out = Vec::new();
    let mut current = String::new();

    for para in paragraphs(piece) {
        if char_len(para) > PROJECT_PIECE_MAX {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            out.extend(window.chunk(para, None));
            continue;
        }
        if !current.is_empty() && char_len(&current) + 2 + char_len(para) > PROJECT_PIECE_MAX {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn technologies(chunk: &str) -> Vec<&'static str> {
    let tokens: BTreeSet<String> = chunk
        .split(|c: char| c.is_whitespace() || ",;:()[]/|".contains(c))
        .map(|t| t.trim_end_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    TECHNOLOGIES
        .iter()
        .copied()
        .filter(|tech| tokens.contains(*tech))
        .collect()
}
