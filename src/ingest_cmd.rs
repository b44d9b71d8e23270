//! `scribe ingest`, `scribe ingest-folder`, and `scribe remove`.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::Value;

use crate::chunk::{create_chunker, create_chunker_named};
use crate::config::Config;
use crate::ingest::{DocumentIngester, IngestOutcome};
use crate::models::Metadata;
use crate::store::SqliteStore;

/// Open the configured store and an ingester over it.
///
/// `chunker` overrides `[chunking].strategy` when given.
pub async fn open_ingester(
    config: &Config,
    chunker: Option<&str>,
) -> Result<(Arc<SqliteStore>, DocumentIngester)> {
    let store = Arc::new(SqliteStore::open(config).await?);
    let chunker = match chunker {
        Some(name) => create_chunker_named(name, &config.chunking)?,
        None => create_chunker(&config.chunking)?,
    };
    let ingester = DocumentIngester::new(store.clone(), chunker);
    Ok((store, ingester))
}

/// Turn `key=value` pairs into metadata. Values that parse as JSON scalars
/// (numbers, booleans) keep their type; everything else is a string.
pub fn metadata_from_pairs(pairs: &[(String, String)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| {
            let value = match serde_json::from_str::<Value>(v) {
                Ok(parsed @ (Value::Number(_) | Value::Bool(_))) => parsed,
                _ => Value::String(v.clone()),
            };
            (k.clone(), value)
        })
        .collect()
}

pub async fn run_ingest(
    config: &Config,
    path: &Path,
    metadata: &[(String, String)],
    chunker: Option<&str>,
) -> Result<()> {
    let (store, ingester) = open_ingester(config, chunker).await?;
    let user_meta = metadata_from_pairs(metadata);

    println!("Ingesting document: {}", path.display());
    if !user_meta.is_empty() {
        println!("  metadata: {}", Value::Object(user_meta.clone()));
    }

    let meta = (!user_meta.is_empty()).then_some(&user_meta);
    let outcome = ingester.ingest_file(path, meta).await;
    let result = match outcome {
        Ok(IngestOutcome::Unchanged { chunks }) => {
            println!("  unchanged ({} chunks already stored)", chunks);
            Ok(())
        }
        Ok(IngestOutcome::Stored { chunks, removed }) => {
            println!("  stored {} chunks with {}", chunks, ingester.chunker().name());
            if removed > 0 {
                println!("  replaced {} stale chunks", removed);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "ingest failed");
            Err(e.context(format!("Failed to ingest {}", path.display())))
        }
    };

    if result.is_ok() {
        let stats = ingester.collection_stats().await?;
        println!(
            "Collection now has {} documents with {} chunks",
            stats.total_documents, stats.total_chunks
        );
    }
    store.close().await;
    result
}

pub async fn run_ingest_folder(
    config: &Config,
    folder: &Path,
    recursive: bool,
    patterns: &[String],
    chunker: Option<&str>,
) -> Result<()> {
    let (store, ingester) = open_ingester(config, chunker).await?;
    let patterns = (!patterns.is_empty()).then_some(patterns);

    println!("Ingesting folder: {}", folder.display());
    let report = ingester
        .ingest_folder(folder, recursive, patterns, None)
        .await?;

    println!("ingest-folder");
    println!("  chunker: {}", ingester.chunker().name());
    println!("  files found: {}", report.total_files);
    println!("  stored: {}", report.successful.len());
    println!("  unchanged: {}", report.skipped.len());
    println!("  failed: {}", report.failed.len());
    println!("  success rate: {:.1}%", report.success_rate() * 100.0);
    for name in &report.failed {
        println!("    failed: {}", name);
    }

    store.close().await;
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}

pub async fn run_remove(config: &Config, filename: &str, confirmed: bool) -> Result<()> {
    let (store, ingester) = open_ingester(config, None).await?;

    let documents = ingester.list_documents().await?;
    if !documents.iter().any(|d| d.filename == filename) {
        println!("Document '{}' not found.", filename);
        if !documents.is_empty() {
            println!("Available documents:");
            for doc in &documents {
                println!("  {}", doc.filename);
            }
        }
        store.close().await;
        bail!("No document named '{}'", filename);
    }

    if !confirmed && !confirm(&format!("Remove all chunks of '{}'?", filename))? {
        println!("Cancelled.");
        store.close().await;
        return Ok(());
    }

    if !ingester.remove_document(filename).await? {
        store.close().await;
        bail!("Failed to remove '{}'", filename);
    }
    let stats = ingester.collection_stats().await?;
    println!("Removed {}", filename);
    println!(
        "Collection now has {} documents with {} chunks",
        stats.total_documents, stats.total_chunks
    );

    store.close().await;
    Ok(())
}
