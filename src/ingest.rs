//! Document ingestion and collection management.
//!
//! [`DocumentIngester`] runs read → metadata → change check → chunk → store
//! for single files and folders, and owns the document-level views of the
//! collection (listing, removal, statistics).
//!
//! # Re-ingestion
//!
//! A filename is the document key. If every stored chunk for the filename
//! carries the new content hash the file is reported as unchanged and
//! nothing is written. Otherwise the new chunk set is upserted first and
//! only then are the previous ids that are not part of the new set deleted,
//! so a failure part-way never leaves the filename with zero chunks.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::json;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::chunk::Chunker;
use crate::metadata::{read_document, MetadataExtractor};
use crate::models::{
    fields, meta_bool, meta_i64, meta_str, CollectionStats, DocumentSummary, FolderReport,
    Metadata, Record,
};
use crate::store::{Filter, VectorStore};

/// Patterns used by [`DocumentIngester::ingest_folder`] when none are given.
pub const DEFAULT_FOLDER_PATTERNS: &[&str] = &[
    "*.txt", "*.md", "*.pdf", "*.docx", "*.py", "*.js", "*.java", "*.cpp", "*.c", "*.h",
];

/// What a successful ingestion did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored chunks already carry this content hash.
    Unchanged { chunks: usize },
    /// A new chunk set was written; `removed` stale chunks were deleted.
    Stored { chunks: usize, removed: usize },
}

/// Deterministic chunk id: `{filename}_chunk_{index}_{sha256(chunk)[..8]}`.
pub fn chunk_id(filename: &str, index: usize, chunk: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(chunk.as_bytes()));
    format!("{}_chunk_{}_{}", filename, index, &digest[..8])
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// `"{first 16 chars}..."`, or the whole hash if shorter.
pub fn hash_prefix(hash: &str) -> String {
    if hash.chars().count() > 16 {
        format!("{}...", hash.chars().take(16).collect::<String>())
    } else {
        hash.to_string()
    }
}

pub struct DocumentIngester {
    store: Arc<dyn VectorStore>,
    chunker: Box<dyn Chunker>,
    extractor: MetadataExtractor,
}

impl DocumentIngester {
    pub fn new(store: Arc<dyn VectorStore>, chunker: Box<dyn Chunker>) -> Self {
        Self {
            store,
            chunker,
            extractor: MetadataExtractor::new(),
        }
    }

    pub fn chunker(&self) -> &dyn Chunker {
        self.chunker.as_ref()
    }

    /// Swap the chunking strategy used for subsequent ingestions.
    pub fn set_chunker(&mut self, chunker: Box<dyn Chunker>) {
        tracing::info!(from = self.chunker.name(), to = chunker.name(), "chunker changed");
        self.chunker = chunker;
    }

    /// Ingest one file. Failures are logged and reported as `false`.
    pub async fn ingest(&self, path: &Path, metadata: Option<&Metadata>) -> bool {
        match self.ingest_file(path, metadata).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "ingest failed");
                false
            }
        }
    }

    /// Ingest one file, returning what was done.
    pub async fn ingest_file(
        &self,
        path: &Path,
        metadata: Option<&Metadata>,
    ) -> Result<IngestOutcome> {
        if !path.is_file() {
            bail!("File not found: {}", path.display());
        }

        let content = read_document(path)?;
        if content.trim().is_empty() {
            bail!("File is empty: {}", path.display());
        }

        let doc_meta = self.extractor.extract(path, &content, metadata)?;
        let filename = meta_str(&doc_meta, fields::FILENAME)
            .unwrap_or_default()
            .to_string();
        let file_hash = meta_str(&doc_meta, fields::SOURCE_FILE_HASH)
            .unwrap_or_default()
            .to_string();

        let existing = self
            .store
            .get(Some(&Filter::eq(fields::FILENAME, filename.as_str())))
            .await?;
        if !existing.is_empty()
            && existing.iter().all(|r| {
                meta_str(&r.metadata, fields::SOURCE_FILE_HASH) == Some(file_hash.as_str())
            })
        {
            tracing::info!(filename = %filename, chunks = existing.len(), "already up to date");
            return Ok(IngestOutcome::Unchanged {
                chunks: existing.len(),
            });
        }

        let chunks = self.chunker.chunk(&content, Some(&doc_meta));
        let total = chunks.len();
        let records: Vec<Record> = chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| Record {
                id: chunk_id(&filename, i, chunk),
                document: chunk.clone(),
                metadata: self.chunker.chunk_metadata(chunk, i, total, &doc_meta),
            })
            .collect();

        let new_ids: HashSet<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let stale: Vec<String> = existing
            .iter()
            .filter(|r| !new_ids.contains(r.id.as_str()))
            .map(|r| r.id.clone())
            .collect();

        self.store.add(records).await?;
        if !stale.is_empty() {
            self.store.delete(&stale).await?;
        }

        tracing::info!(
            filename = %filename,
            chunks = total,
            removed = stale.len(),
            chunker = self.chunker.name(),
            "ingested"
        );
        Ok(IngestOutcome::Stored {
            chunks: total,
            removed: stale.len(),
        })
    }

    /// Ingest every matching file under `folder`.
    ///
    /// Each file is ingested independently; one failure does not stop the
    /// batch. Files whose stored chunks are already current land in
    /// `skipped`.
    pub async fn ingest_folder(
        &self,
        folder: &Path,
        recursive: bool,
        patterns: Option<&[String]>,
        metadata: Option<&Metadata>,
    ) -> Result<FolderReport> {
        if !folder.is_dir() {
            bail!("Folder not found: {}", folder.display());
        }

        let patterns: Vec<String> = match patterns {
            Some(p) if !p.is_empty() => p.to_vec(),
            _ => DEFAULT_FOLDER_PATTERNS.iter().map(|s| s.to_string()).collect(),
        };
        let globs = build_globset(&patterns)?;

        let mut walker = WalkDir::new(folder);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut files: BTreeSet<PathBuf> = BTreeSet::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() && globs.is_match(entry.file_name()) {
                files.insert(entry.into_path());
            }
        }

        let mut report = FolderReport {
            total_files: files.len(),
            ..Default::default()
        };

        for path in &files {
            let relative = path.strip_prefix(folder).unwrap_or(path);
            let mut file_meta = Metadata::new();
            file_meta.insert(fields::BATCH_INGESTION.into(), json!(true));
            file_meta.insert(
                fields::SOURCE_FOLDER.into(),
                json!(folder.display().to_string()),
            );
            if let Some(caller) = metadata {
                file_meta.extend(caller.clone());
            }
            file_meta.insert(
                fields::RELATIVE_PATH.into(),
                json!(relative.display().to_string()),
            );
            file_meta.insert(
                fields::FOLDER_DEPTH.into(),
                json!(relative.components().count().saturating_sub(1)),
            );

            let label = relative.display().to_string();
            match self.ingest_file(path, Some(&file_meta)).await {
                Ok(IngestOutcome::Stored { .. }) => report.successful.push(label),
                Ok(IngestOutcome::Unchanged { .. }) => report.skipped.push(label),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "ingest failed");
                    report.failed.push(label);
                }
            }
        }

        Ok(report)
    }

    /// One summary per stored filename, sorted by filename.
    pub async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let records = self.store.get(None).await?;
        let mut by_file: BTreeMap<String, DocumentSummary> = BTreeMap::new();

        for record in &records {
            let meta = &record.metadata;
            let filename = meta_str(meta, fields::FILENAME)
                .unwrap_or("unknown")
                .to_string();
            let summary = by_file
                .entry(filename.clone())
                .or_insert_with(|| DocumentSummary {
                    filename,
                    filepath: meta_str(meta, fields::FILEPATH)
                        .unwrap_or_default()
                        .to_string(),
                    document_type: meta_str(meta, fields::DOCUMENT_TYPE)
                        .unwrap_or("unknown")
                        .to_string(),
                    chunk_count: 0,
                    total_size: 0,
                    chunker_type: meta_str(meta, fields::CHUNKER_TYPE)
                        .unwrap_or("unknown")
                        .to_string(),
                    ingestion_time: meta_i64(meta, fields::INGESTION_TIME),
                    file_hash: hash_prefix(
                        meta_str(meta, fields::SOURCE_FILE_HASH).unwrap_or_default(),
                    ),
                    is_original_content: meta_bool(meta, fields::IS_ORIGINAL_CONTENT),
                });
            summary.chunk_count += 1;
            summary.total_size += record.document.chars().count();
        }

        Ok(by_file.into_values().collect())
    }

    /// Delete every chunk of `filename`. Returns `false` if none exist.
    pub async fn remove_document(&self, filename: &str) -> Result<bool> {
        let ids: Vec<String> = self
            .store
            .get(Some(&Filter::eq(fields::FILENAME, filename)))
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            tracing::warn!(filename, "no chunks found to remove");
            return Ok(false);
        }
        self.store.delete(&ids).await?;
        tracing::info!(filename, chunks = ids.len(), "removed document");
        Ok(true)
    }

    pub async fn collection_stats(&self) -> Result<CollectionStats> {
        let records = self.store.get(None).await?;
        let mut stats = CollectionStats {
            total_chunks: records.len(),
            collection_name: self.store.collection().to_string(),
            chunker_type: self.chunker.name().to_string(),
            ..Default::default()
        };

        let mut files = HashSet::new();
        for record in &records {
            let meta = &record.metadata;
            if let Some(name) = meta_str(meta, fields::FILENAME) {
                files.insert(name);
            }
            if meta_bool(meta, fields::IS_ORIGINAL_CONTENT) {
                stats.original_content_chunks += 1;
            }
            stats.total_characters += record.document.chars().count();
            let doc_type = meta_str(meta, fields::DOCUMENT_TYPE).unwrap_or("unknown");
            *stats.document_types.entry(doc_type.to_string()).or_insert(0) += 1;
        }
        stats.total_documents = files.len();

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::FixedWindowChunker;
    use crate::store::InMemoryStore;
    use tempfile::TempDir;

    fn ingester() -> (Arc<InMemoryStore>, DocumentIngester) {
        let store = Arc::new(InMemoryStore::default());
        let ingester = DocumentIngester::new(store.clone(), Box::new(FixedWindowChunker::default()));
        (store, ingester)
    }

    #[test]
    fn test_chunk_id_is_deterministic() {
        let a = chunk_id("notes.txt", 2, "hello");
        assert_eq!(a, chunk_id("notes.txt", 2, "hello"));
        assert!(a.starts_with("notes.txt_chunk_2_"));
        assert_eq!(a.len(), "notes.txt_chunk_2_".len() + 8);
        assert_ne!(a, chunk_id("notes.txt", 2, "hello!"));
    }

    #[test]
    fn test_hash_prefix() {
        assert_eq!(hash_prefix("0123456789abcdef0123"), "0123456789abcdef...");
        assert_eq!(hash_prefix("abc"), "abc");
    }

    #[tokio::test]
    async fn test_missing_and_blank_files_fail() {
        let tmp = TempDir::new().unwrap();
        let (store, ingester) = ingester();

        assert!(!ingester.ingest(&tmp.path().join("missing.txt"), None).await);

        let blank = tmp.path().join("blank.txt");
        std::fs::write(&blank, "  \n\n ").unwrap();
        assert!(!ingester.ingest(&blank, None).await);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chunks_carry_document_metadata() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "word ".repeat(240)).unwrap();
        let (store, ingester) = ingester();

        let outcome = ingester.ingest_file(&path, None).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Stored { chunks: 3, removed: 0 });

        let records = store.get(None).await.unwrap();
        for (i, r) in records.iter().enumerate() {
            assert_eq!(r.metadata["chunk_index"], i);
            assert_eq!(r.metadata["chunk_count"], 3);
            assert_eq!(r.metadata["filename"], "notes.txt");
            assert_eq!(r.metadata["chunker_type"], "default");
            assert_eq!(r.id, chunk_id("notes.txt", i, &r.document));
        }
    }

    #[tokio::test]
    async fn test_folder_ingestion() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::write(root.join("resume.txt"), "Experience: Rust").unwrap();
        std::fs::write(root.join("notes.md"), "# Notes\nSome notes").unwrap();
        std::fs::write(root.join("image.png"), "not text").unwrap();
        std::fs::write(root.join("empty.txt"), "   ").unwrap();
        std::fs::write(root.join("sub").join("project.md"), "Project one").unwrap();

        let (store, ingester) = ingester();

        let flat = ingester.ingest_folder(root, false, None, None).await.unwrap();
        assert_eq!(flat.total_files, 3);
        assert_eq!(flat.successful.len(), 2);
        assert_eq!(flat.failed, vec!["empty.txt".to_string()]);

        let deep = ingester.ingest_folder(root, true, None, None).await.unwrap();
        assert_eq!(deep.total_files, 4);
        assert_eq!(deep.skipped.len(), 2);
        assert_eq!(deep.successful.len(), 1);
        assert!((deep.success_rate() - 0.75).abs() < 1e-9);

        let nested = store
            .get(Some(&Filter::eq("filename", "project.md")))
            .await
            .unwrap();
        assert_eq!(nested[0].metadata["folder_depth"], 1);
        assert_eq!(nested[0].metadata["batch_ingestion"], true);

        let mut caller = Metadata::new();
        caller.insert("source_folder".into(), json!("career archive"));
        caller.insert("batch_ingestion".into(), json!(false));
        std::fs::write(root.join("resume.txt"), "Experience: Rust and Go").unwrap();
        ingester
            .ingest_folder(root, false, None, Some(&caller))
            .await
            .unwrap();
        let resume = store
            .get(Some(&Filter::eq("filename", "resume.txt")))
            .await
            .unwrap();
        assert_eq!(resume[0].metadata["source_folder"], "career archive");
        assert_eq!(resume[0].metadata["batch_ingestion"], false);
        assert_eq!(resume[0].metadata["relative_path"], "resume.txt");

        let only_md = vec!["*.md".to_string()];
        let md = ingester
            .ingest_folder(root, true, Some(&only_md), None)
            .await
            .unwrap();
        assert_eq!(md.total_files, 2);

        assert!(ingester
            .ingest_folder(&root.join("nope"), true, None, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_list_remove_and_stats() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("resume_jane.txt");
        let b = tmp.path().join("app.py");
        std::fs::write(&a, "Experience\n\nRust and Go").unwrap();
        std::fs::write(&b, "def main():\n    pass\n").unwrap();
        let (_store, ingester) = ingester();
        assert!(ingester.ingest(&a, None).await);
        assert!(ingester.ingest(&b, None).await);

        let docs = ingester.list_documents().await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].filename, "app.py");
        assert_eq!(docs[0].document_type, "code");
        assert_eq!(docs[1].document_type, "resume");
        assert!(docs[1].file_hash.ends_with("..."));

        let stats = ingester.collection_stats().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.total_chunks, 2);
        assert_eq!(stats.original_content_chunks, 2);
        assert_eq!(stats.document_types["code"], 1);
        assert_eq!(stats.chunker_type, "default");

        assert!(ingester.remove_document("app.py").await.unwrap());
        assert!(!ingester.remove_document("app.py").await.unwrap());
        assert_eq!(ingester.list_documents().await.unwrap().len(), 1);
    }
}
