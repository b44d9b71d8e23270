//! # Scribe
//!
//! A personal-profile writing assistant: ingest your resume, project notes,
//! and cover letters into a local vector store, retrieve the passages that
//! matter for a request, and have a local LLM draft the text.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Ingester  │──▶│   Chunkers   │──▶│ VectorStore  │
//! │ read+meta  │   │ fixed/sem/.. │   │ SQLite/memory│
//! └────────────┘   └──────────────┘   └──────┬───────┘
//!                                            │
//!                     ┌──────────────────────┤
//!                     ▼                      ▼
//!              ┌─────────────┐       ┌──────────────┐
//!              │  Retrieval  │──────▶│   Writing    │──▶ Ollama
//!              │ 4 modes     │       │   session    │──▶ web search
//!              └─────────────┘       └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! scribe init
//! scribe ingest-folder ./profile --recursive --chunker document_type
//! scribe search "distributed systems experience" --multi-stage
//! scribe chat --company https://example.com --query "cover letter for the SRE role"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Records, query results, reports |
//! | [`chunk`] | Chunking strategies |
//! | [`metadata`] | Text decoding and metadata extraction |
//! | [`extract`] | PDF / DOCX to text |
//! | [`ingest`] | Document ingestion and management |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`retrieval`] | Plain, multi-stage, cluster, and personalized retrieval |
//! | [`llm`] | Ollama chat client |
//! | [`web`] | Ollama web search / fetch client |
//! | [`writer`] | Writing sessions and saved samples |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat_cmd;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod ingest_cmd;
pub mod llm;
pub mod metadata;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod search;
pub mod stats;
pub mod store;
pub mod web;
pub mod writer;
