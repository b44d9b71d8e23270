//! `scribe search`, `scribe verify`, and `scribe feedback`.
//!
//! The retrieval mode is picked from the flags: `--cluster` wins over
//! `--multi-stage`; any of `--category`, `--ext`, or `--recent` selects
//! personalized retrieval; otherwise a plain similarity query is run.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::config::Config;
use crate::ingest::hash_prefix;
use crate::models::{fields, meta_i64, IntegrityStatus, QueryResult, SourceIntegrity};
use crate::retrieval::{Preferences, RetrievalEngine};
use crate::store::SqliteStore;

/// Flags accepted by `scribe search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: Option<usize>,
    pub multi_stage: bool,
    pub cluster: bool,
    pub categories: Vec<String>,
    pub extensions: Vec<String>,
    pub recent: bool,
    pub show_metadata: bool,
}

impl SearchOptions {
    fn preferences(&self) -> Option<Preferences> {
        if self.categories.is_empty() && self.extensions.is_empty() && !self.recent {
            return None;
        }
        Some(Preferences {
            categories: (!self.categories.is_empty()).then(|| self.categories.clone()),
            preferred_file_types: (!self.extensions.is_empty()).then(|| self.extensions.clone()),
            prefer_recent: self.recent,
        })
    }
}

/// Run the query in the mode selected by `options`.
pub async fn search(engine: &RetrievalEngine, query: &str, options: &SearchOptions) -> QueryResult {
    let config = engine.config();
    if options.cluster {
        let n = options.limit.unwrap_or(config.n_results);
        return engine.cluster_query(query, n).await;
    }
    if options.multi_stage {
        let n = options.limit.unwrap_or(config.final_results);
        return engine
            .multi_stage_query_with(query, config.initial_results.max(n), n)
            .await;
    }
    let n = options.limit.unwrap_or(config.n_results);
    match options.preferences() {
        Some(prefs) => engine.personalized_query(query, &prefs, n).await,
        None => engine.query(query, n).await,
    }
}

fn excerpt(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() > max {
        format!("{}...", flat.chars().take(max).collect::<String>())
    } else {
        flat.to_string()
    }
}

fn print_result(result: &QueryResult, show_metadata: bool) {
    if result.source_integrity == SourceIntegrity::Error {
        println!("Search failed; see log for details.");
        return;
    }
    if result.is_empty() {
        println!("No results.");
        return;
    }

    if let Some(info) = &result.cluster_info {
        let parts: Vec<String> = info.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("clusters: {}", parts.join(", "));
        println!();
    }

    for (i, chunk) in result.chunks.iter().enumerate() {
        let meta = &chunk.metadata;
        let score = chunk
            .score
            .map(|s| format!("[{:.2}] ", s))
            .unwrap_or_default();
        let doc_type = meta
            .get(fields::DOCUMENT_TYPE)
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        println!("{}. {}{} ({})", i + 1, score, chunk.filename(), doc_type);
        if let (Some(idx), Some(count)) = (
            meta_i64(meta, fields::CHUNK_INDEX),
            meta_i64(meta, fields::CHUNK_COUNT),
        ) {
            println!("    chunk: {}/{}", idx + 1, count);
        }
        if let Some(cluster) = &chunk.cluster {
            println!("    cluster: {}", cluster);
        }
        println!("    excerpt: \"{}\"", excerpt(&chunk.text, 200));
        println!("    id: {}", chunk.id);
        if show_metadata {
            println!("    metadata: {}", Value::Object(meta.clone()));
        }
        println!();
    }
}

async fn open_engine(config: &Config) -> Result<(Arc<SqliteStore>, RetrievalEngine)> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let engine = RetrievalEngine::new(store.clone(), config.retrieval.clone());
    Ok((store, engine))
}

pub async fn run_search(config: &Config, query: &str, options: &SearchOptions) -> Result<()> {
    let (store, engine) = open_engine(config).await?;
    let result = search(&engine, query, options).await;
    print_result(&result, options.show_metadata);
    store.close().await;
    Ok(())
}

pub async fn run_verify(config: &Config, filename: &str) -> Result<()> {
    let (store, engine) = open_engine(config).await?;
    let report = engine.verify(filename).await;
    store.close().await;

    println!("verify {}", filename);
    match report.status {
        IntegrityStatus::Verified => {
            println!("  status: verified");
            println!("  chunks: {}", report.chunk_count);
            if let Some(hash) = &report.original_hash {
                println!("  hash: {}", hash_prefix(hash));
            }
            Ok(())
        }
        IntegrityStatus::NotFound => {
            println!("  status: not found");
            Ok(())
        }
        IntegrityStatus::Error => {
            println!("  status: error");
            if report.chunk_count > 0 {
                println!("  chunks: {} (hashes disagree)", report.chunk_count);
            }
            bail!("Integrity check failed for '{}'", filename)
        }
    }
}

pub async fn run_feedback(
    config: &Config,
    query: &str,
    chunk_id: &str,
    relevance: f64,
) -> Result<()> {
    let (store, engine) = open_engine(config).await?;
    let recorded = engine.record_feedback(query, chunk_id, relevance).await;
    store.close().await;

    if !recorded? {
        bail!("No chunk with id '{}'", chunk_id);
    }
    println!("Recorded feedback for {}", chunk_id);
    Ok(())
}
