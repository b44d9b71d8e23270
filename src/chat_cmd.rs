//! `scribe chat`, `scribe websearch`, `scribe webfetch`, and `scribe models`.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Result};

use crate::config::Config;
use crate::ingest_cmd::open_ingester;
use crate::llm::OllamaClient;
use crate::retrieval::RetrievalEngine;
use crate::stats::format_bytes;
use crate::web::WebSearchClient;
use crate::writer::WritingSession;

fn prompt_line(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn required(value: Option<String>, label: &str) -> Result<String> {
    let value = match value {
        Some(v) => v,
        None => prompt_line(label)?,
    };
    if value.trim().is_empty() {
        bail!("{} is required", label);
    }
    Ok(value)
}

/// Options for `scribe chat`.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub company: Option<String>,
    pub request: Option<String>,
    pub model: Option<String>,
    pub context_limit: Option<usize>,
    /// Add a web search on the company to the prompt.
    pub research: bool,
}

pub async fn run_chat(config: &Config, options: ChatOptions) -> Result<()> {
    let (store, ingester) = open_ingester(config, None).await?;
    let stats = ingester.collection_stats().await?;
    if stats.total_documents == 0 {
        println!("No documents found in your profile.");
        println!("Use 'scribe ingest <file>' to add your resume, work history, etc.");
    } else {
        println!(
            "Your profile: {} documents, {} chunks",
            stats.total_documents, stats.total_chunks
        );
    }
    println!();

    let llm = OllamaClient::from_config(&config.llm, options.model.as_deref()).await?;
    if !llm.model_available() {
        println!(
            "Warning: model '{}' is not installed; run `ollama pull {}`",
            llm.model(),
            llm.model()
        );
    }

    let company = required(options.company, "Company name or URL")?;
    let request = required(options.request, "What would you like me to write")?;

    let engine = RetrievalEngine::new(store.clone(), config.retrieval.clone());
    let mut session = WritingSession::new(engine, llm, config)?;
    if let Some(limit) = options.context_limit {
        session = session.with_context_limit(limit);
    }
    if options.research {
        session = session.with_web(WebSearchClient::new(None, &config.web)?);
    }

    println!("Generating with {}...", session.model());
    println!("{}", "=".repeat(60));
    let outcome = session
        .run(&company, &request, |fragment| {
            print!("{}", fragment);
            let _ = io::stdout().flush();
        })
        .await;
    println!();
    println!("{}", "=".repeat(60));
    store.close().await;

    let outcome = outcome?;
    let mut sources: Vec<&str> = outcome.context.chunks.iter().map(|c| c.filename()).collect();
    sources.sort_unstable();
    sources.dedup();
    if sources.is_empty() {
        println!("No relevant context found in your profile.");
    } else {
        println!(
            "Context: {} chunks from {}",
            outcome.context.chunks.len(),
            sources.join(", ")
        );
    }
    println!("Saved to: {}", outcome.saved_to.display());
    Ok(())
}

pub async fn run_websearch(config: &Config, query: &str, max_results: Option<usize>) -> Result<()> {
    let client = WebSearchClient::new(None, &config.web)?;
    let max_results = max_results.unwrap_or(client.default_max_results());
    let summary = client.search_and_summarize(query, max_results).await?;
    print!("{}", summary);
    Ok(())
}

pub async fn run_webfetch(config: &Config, url: &str) -> Result<()> {
    let client = WebSearchClient::new(None, &config.web)?;
    let page = client.fetch(url).await?;
    println!("--- {} ---", page.title);
    println!("{}", page.content);
    println!();
    println!("--- Links ({}) ---", page.links.len());
    for link in &page.links {
        println!("{}", link);
    }
    Ok(())
}

pub async fn run_models(config: &Config) -> Result<()> {
    let client = OllamaClient::from_config(&config.llm, None).await?;
    let models = client.list_models().await?;
    println!("Ollama at {}", client.host());
    if models.is_empty() {
        println!("  no models installed");
    }
    for model in &models {
        let marker = if crate::llm::model_matches(&model.name, client.model()) {
            "*"
        } else {
            " "
        };
        println!("  {} {:<32} {:>10}", marker, model.name, format_bytes(model.size));
    }
    Ok(())
}
