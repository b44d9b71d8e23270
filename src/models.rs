//! Core data models used throughout Scribe.
//!
//! These types represent the store records, retrieved chunks, and query
//! results that flow through the ingestion and retrieval pipeline. Record
//! metadata is a flat, string-keyed JSON object so that any strategy-specific
//! field survives a round trip through the vector store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Flat string-keyed metadata attached to every stored chunk.
pub type Metadata = serde_json::Map<String, Value>;

/// Well-known metadata keys shared by the extractor, chunkers, and retrieval.
pub mod fields {
    pub const FILENAME: &str = "filename";
    pub const FILEPATH: &str = "filepath";
    pub const FILE_EXTENSION: &str = "file_extension";
    pub const FILE_SIZE: &str = "file_size";
    pub const FILE_SIZE_BYTES: &str = "file_size_bytes";
    pub const SOURCE_FILE_HASH: &str = "source_file_hash";
    pub const INGESTION_TIME: &str = "ingestion_time";
    pub const FILE_MODIFIED_TIME: &str = "file_modified_time";
    pub const FILE_CREATED_TIME: &str = "file_created_time";
    pub const CHARACTER_COUNT: &str = "character_count";
    pub const WORD_COUNT: &str = "word_count";
    pub const LINE_COUNT: &str = "line_count";
    pub const PARAGRAPH_COUNT: &str = "paragraph_count";
    pub const IS_ORIGINAL_CONTENT: &str = "is_original_content";
    pub const CONTENT_MODIFIED: &str = "content_modified";
    pub const DOCUMENT_TYPE: &str = "document_type";
    pub const MIME_TYPE: &str = "mime_type";
    pub const HAS_CODE: &str = "has_code";
    pub const HAS_STRUCTURED_DATA: &str = "has_structured_data";
    pub const LANGUAGE: &str = "language";
    pub const PROCESSOR_VERSION: &str = "processor_version";
    pub const EXTRACTION_TIME: &str = "extraction_time";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const CHUNK_COUNT: &str = "chunk_count";
    pub const CHUNK_SIZE: &str = "chunk_size";
    pub const CHUNKER_TYPE: &str = "chunker_type";
    pub const ADAPTIVE_CHUNKER_TYPE: &str = "adaptive_chunker_type";
    pub const USER_FEEDBACK: &str = "user_feedback";
    pub const RELATIVE_PATH: &str = "relative_path";
    pub const FOLDER_DEPTH: &str = "folder_depth";
    pub const BATCH_INGESTION: &str = "batch_ingestion";
    pub const SOURCE_FOLDER: &str = "source_folder";
}

/// Inferred category of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Resume,
    CoverLetter,
    Project,
    Profile,
    Documentation,
    Code,
    Document,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Resume => "resume",
            DocumentType::CoverLetter => "cover_letter",
            DocumentType::Project => "project",
            DocumentType::Profile => "profile",
            DocumentType::Documentation => "documentation",
            DocumentType::Code => "code",
            DocumentType::Document => "document",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored chunk: id, text, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub document: String,
    pub metadata: Metadata,
}

/// A record returned by a similarity query, with the backend's raw score.
///
/// Higher scores are better. Hits are returned in the store's native
/// relevance order.
#[derive(Debug, Clone)]
pub struct QueryHit {
    pub record: Record,
    pub score: f64,
}

/// Whether metadata round-tripped through a retrieval call without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceIntegrity {
    Preserved,
    Error,
}

impl fmt::Display for SourceIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceIntegrity::Preserved => f.write_str("preserved"),
            SourceIntegrity::Error => f.write_str("error"),
        }
    }
}

/// A chunk selected by the retrieval engine.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub metadata: Metadata,
    /// Re-ranking score (multi-stage retrieval only).
    pub score: Option<f64>,
    /// Cluster label (cluster-based retrieval only).
    pub cluster: Option<String>,
}

impl RetrievedChunk {
    pub fn filename(&self) -> &str {
        self.metadata
            .get(fields::FILENAME)
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

/// Ordered output of one retrieval call. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub chunks: Vec<RetrievedChunk>,
    pub source_integrity: SourceIntegrity,
    /// Candidate count per document type (cluster-based retrieval only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_info: Option<BTreeMap<String, usize>>,
}

impl QueryResult {
    pub fn empty(query: &str, source_integrity: SourceIntegrity) -> Self {
        Self {
            query: query.to_string(),
            chunks: Vec::new(),
            source_integrity,
            cluster_info: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Per-filename view of the collection, as shown by `scribe list`.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub filepath: String,
    pub document_type: String,
    pub chunk_count: usize,
    pub total_size: usize,
    pub chunker_type: String,
    pub ingestion_time: Option<i64>,
    pub file_hash: String,
    pub is_original_content: bool,
}

/// Aggregate statistics over the whole collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionStats {
    pub total_documents: usize,
    pub total_chunks: usize,
    pub original_content_chunks: usize,
    pub total_characters: usize,
    pub document_types: BTreeMap<String, usize>,
    pub collection_name: String,
    pub chunker_type: String,
}

/// Outcome of [`RetrievalEngine::verify`](crate::retrieval::RetrievalEngine::verify).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    Verified,
    NotFound,
    Error,
}

/// Integrity report for a single filename.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub status: IntegrityStatus,
    pub filename: String,
    pub original_hash: Option<String>,
    pub chunk_count: usize,
    /// True when every original-content chunk carries the same hash.
    pub integrity_preserved: bool,
}

/// Summary returned by folder ingestion.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FolderReport {
    pub total_files: usize,
    pub successful: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

impl FolderReport {
    /// Share of files that are stored and current (newly written or unchanged).
    pub fn success_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.successful.len() + self.skipped.len()) as f64 / self.total_files as f64
        }
    }
}

/// Read a string field from metadata.
pub fn meta_str<'a>(metadata: &'a Metadata, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Value::as_str)
}

/// Read a boolean field from metadata, treating absence as `false`.
pub fn meta_bool(metadata: &Metadata, key: &str) -> bool {
    metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Read an integer field from metadata (accepts floats by truncation).
pub fn meta_i64(metadata: &Metadata, key: &str) -> Option<i64> {
    match metadata.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    }
}
