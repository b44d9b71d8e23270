//! Collection overview for `scribe stats` and `scribe list`.

use anyhow::Result;

use crate::config::Config;
use crate::ingest_cmd::open_ingester;

/// Print collection totals and the per-document-type breakdown.
pub async fn run_stats(config: &Config) -> Result<()> {
    let (store, ingester) = open_ingester(config, None).await?;
    let stats = ingester.collection_stats().await?;
    store.close().await;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Scribe Collection Stats");
    println!("=======================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Collection:  {}", stats.collection_name);
    println!("  Chunker:     {}", stats.chunker_type);
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!(
        "  Chunks:      {} ({} original)",
        stats.total_chunks, stats.original_content_chunks
    );
    println!("  Characters:  {}", stats.total_characters);

    if !stats.document_types.is_empty() {
        println!();
        println!("  By document type:");
        println!("  {:<20} {:>8}", "TYPE", "CHUNKS");
        println!("  {}", "-".repeat(29));
        for (doc_type, count) in &stats.document_types {
            println!("  {:<20} {:>8}", doc_type, count);
        }
    }
    println!();
    Ok(())
}

/// Print one line per stored document; `verbose` adds path, size, and hash.
pub async fn run_list(config: &Config, verbose: bool) -> Result<()> {
    let (store, ingester) = open_ingester(config, None).await?;
    let documents = ingester.list_documents().await?;
    store.close().await;

    if documents.is_empty() {
        println!("No documents found.");
        println!("Use 'scribe ingest <file>' to add documents.");
        return Ok(());
    }

    for doc in &documents {
        let ingested = doc
            .ingestion_time
            .map(format_ts_relative)
            .unwrap_or_else(|| "unknown".to_string());
        println!(
            "{}  [{}]  {} chunks  {}",
            doc.filename, doc.document_type, doc.chunk_count, ingested
        );
        if verbose {
            println!("    path: {}", doc.filepath);
            println!("    size: {} characters", doc.total_size);
            println!("    chunker: {}", doc.chunker_type);
            println!("    hash: {}", doc.file_hash);
            println!("    original: {}", doc.is_original_content);
            println!();
        }
    }
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now ("3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    relative_to(ts, chrono::Utc::now().timestamp())
}

fn relative_to(ts: i64, now: i64) -> String {
    let delta = now - ts;
    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
