//! # Scribe CLI (`scribe`)
//!
//! ## Usage
//!
//! ```bash
//! scribe --config ./config/scribe.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scribe init` | Create the SQLite database and schema |
//! | `scribe ingest <file>` | Ingest one document |
//! | `scribe ingest-folder <dir>` | Ingest every matching file in a folder |
//! | `scribe list` | List stored documents |
//! | `scribe remove <filename>` | Delete a document's chunks |
//! | `scribe search "<query>"` | Retrieve relevant chunks |
//! | `scribe verify <filename>` | Check a document's source integrity |
//! | `scribe stats` | Collection statistics |
//! | `scribe feedback` | Record a relevance judgement for a chunk |
//! | `scribe chat` | Draft a cover letter, email, or answer |
//! | `scribe websearch "<query>"` | Search the web |
//! | `scribe webfetch <url>` | Fetch a page's content and links |
//! | `scribe models` | List installed Ollama models |

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scribe::chat_cmd::{self, ChatOptions};
use scribe::config;
use scribe::search::{self, SearchOptions};
use scribe::{ingest_cmd, migrate, stats};

/// Scribe: a personal-profile writing assistant backed by a local LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. A missing file means built-in defaults.
#[derive(Parser)]
#[command(
    name = "scribe",
    about = "Scribe: retrieval-augmented professional writing from your own documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log progress at info level (overridden by RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a single document.
    Ingest {
        /// File to ingest (.txt, .md, .py, .pdf, .docx, ...).
        path: PathBuf,

        /// Extra metadata as `key=value`; may be repeated.
        #[arg(long, short = 'm', value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,

        /// Chunker to use instead of `[chunking].strategy`.
        #[arg(long)]
        chunker: Option<String>,
    },

    /// Ingest all matching files in a folder.
    IngestFolder {
        folder: PathBuf,

        /// Descend into subdirectories.
        #[arg(long, short = 'r')]
        recursive: bool,

        /// Filename glob patterns; may be repeated.
        #[arg(long = "patterns", num_args = 1..)]
        patterns: Vec<String>,

        /// Chunker: default, semantic, code, document_type, resume_sections,
        /// project_descriptions.
        #[arg(long)]
        chunker: Option<String>,
    },

    /// List stored documents.
    List {
        /// Show path, size, chunker, and hash.
        #[arg(long)]
        detailed: bool,
    },

    /// Remove every chunk of a document.
    Remove {
        filename: String,

        /// Skip the confirmation prompt.
        #[arg(long, short = 'y')]
        confirm: bool,
    },

    /// Retrieve chunks relevant to a query.
    Search {
        query: String,

        #[arg(long, short = 'l')]
        limit: Option<usize>,

        /// Re-rank a wider candidate set.
        #[arg(long)]
        multi_stage: bool,

        /// Spread results across document types.
        #[arg(long)]
        cluster: bool,

        /// Restrict to document types; may be repeated.
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Restrict to file extensions; may be repeated.
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Prefer recently ingested documents.
        #[arg(long)]
        recent: bool,

        #[arg(long)]
        show_metadata: bool,
    },

    /// Check that a document's chunks share one source hash.
    Verify { filename: String },

    /// Show collection statistics.
    Stats,

    /// Record how relevant a chunk was for a query.
    Feedback {
        query: String,
        chunk_id: String,
        /// Relevance in [0.0, 1.0].
        relevance: f64,
    },

    /// Generate professional writing from your profile.
    Chat {
        /// Company name or URL (prompted if omitted).
        #[arg(long, short = 'c')]
        company: Option<String>,

        /// What to write (prompted if omitted).
        #[arg(long, short = 'q')]
        query: Option<String>,

        /// Ollama model (defaults to `[llm].model`).
        #[arg(long)]
        model: Option<String>,

        /// Number of context chunks to retrieve.
        #[arg(long)]
        context_limit: Option<usize>,

        /// Add a web search on the company (needs OLLAMA_API_KEY).
        #[arg(long)]
        research: bool,
    },

    /// Search the web via Ollama's web search API.
    Websearch {
        query: String,

        #[arg(long)]
        max_results: Option<usize>,
    },

    /// Fetch a web page via Ollama's web fetch API.
    Webfetch { url: String },

    /// List models installed in the local Ollama server.
    Models,
}

/// Parse a `key=value` pair for `--metadata` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Ingest {
            path,
            metadata,
            chunker,
        } => {
            ingest_cmd::run_ingest(&cfg, &path, &metadata, chunker.as_deref()).await?;
        }
        Commands::IngestFolder {
            folder,
            recursive,
            patterns,
            chunker,
        } => {
            ingest_cmd::run_ingest_folder(&cfg, &folder, recursive, &patterns, chunker.as_deref())
                .await?;
        }
        Commands::List { detailed } => {
            stats::run_list(&cfg, detailed || cli.verbose).await?;
        }
        Commands::Remove { filename, confirm } => {
            ingest_cmd::run_remove(&cfg, &filename, confirm).await?;
        }
        Commands::Search {
            query,
            limit,
            multi_stage,
            cluster,
            categories,
            extensions,
            recent,
            show_metadata,
        } => {
            let options = SearchOptions {
                limit,
                multi_stage,
                cluster,
                categories,
                extensions,
                recent,
                show_metadata,
            };
            search::run_search(&cfg, &query, &options).await?;
        }
        Commands::Verify { filename } => {
            search::run_verify(&cfg, &filename).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Feedback {
            query,
            chunk_id,
            relevance,
        } => {
            search::run_feedback(&cfg, &query, &chunk_id, relevance).await?;
        }
        Commands::Chat {
            company,
            query,
            model,
            context_limit,
            research,
        } => {
            let options = ChatOptions {
                company,
                request: query,
                model,
                context_limit,
                research,
            };
            chat_cmd::run_chat(&cfg, options).await?;
        }
        Commands::Websearch { query, max_results } => {
            chat_cmd::run_websearch(&cfg, &query, max_results).await?;
        }
        Commands::Webfetch { url } => {
            chat_cmd::run_webfetch(&cfg, &url).await?;
        }
        Commands::Models => {
            chat_cmd::run_models(&cfg).await?;
        }
    }

    Ok(())
}
