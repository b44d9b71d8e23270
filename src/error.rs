//! Typed errors for the external service seams.
//!
//! Internal plumbing uses `anyhow`; callers that need to react to a
//! specific failure (an unreachable LLM server, a rejected API key) match on
//! these enums instead.

use thiserror::Error;

/// Where to obtain a new Ollama web API key.
pub const API_KEY_URL: &str = "https://ollama.com/settings/keys";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("cannot reach Ollama at {host}: {source}")]
    Unreachable {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("model '{model}' is not available; run `ollama pull {model}`")]
    ModelUnavailable { model: String },

    #[error("Ollama returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response from Ollama: {0}")]
    Decode(String),

    #[error("request to Ollama failed: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("OLLAMA_API_KEY is not set; create a key at {API_KEY_URL}")]
    MissingApiKey,

    #[error("invalid API key. Check your OLLAMA_API_KEY or get a new one at {API_KEY_URL}")]
    InvalidApiKey,

    #[error("web API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("web request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed web API response: {0}")]
    Decode(String),
}

/// Failure to turn a binary document into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),

    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("DOCX extraction failed: {0}")]
    Docx(String),
}
