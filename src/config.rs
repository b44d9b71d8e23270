use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config/scribe.toml";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            collection: default_collection(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/scribe.sqlite")
}
fn default_collection() -> String {
    "user_profile".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default = "default_code_max_chunk_size")]
    pub code_max_chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
            code_max_chunk_size: default_code_max_chunk_size(),
        }
    }
}

fn default_strategy() -> String {
    "default".to_string()
}
fn default_chunk_size() -> usize {
    500
}
fn default_overlap() -> usize {
    50
}
fn default_min_chunk_size() -> usize {
    100
}
fn default_max_chunk_size() -> usize {
    1000
}
fn default_code_max_chunk_size() -> usize {
    800
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_n_results")]
    pub n_results: usize,
    #[serde(default = "default_initial_results")]
    pub initial_results: usize,
    #[serde(default = "default_final_results")]
    pub final_results: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            n_results: default_n_results(),
            initial_results: default_initial_results(),
            final_results: default_final_results(),
        }
    }
}

fn default_n_results() -> usize {
    5
}
fn default_initial_results() -> usize {
    20
}
fn default_final_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ollama host used for `/api/embed`; falls back to `llm.host`.
    #[serde(default)]
    pub host: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            host: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_host")]
    pub host: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            host: default_llm_host(),
            model: default_llm_model(),
            temperature: default_temperature(),
            max_tokens: None,
            context_limit: default_context_limit(),
        }
    }
}

fn default_llm_host() -> String {
    "http://localhost:11434".to_string()
}
fn default_llm_model() -> String {
    "gemma3".to_string()
}
fn default_temperature() -> f64 {
    0.7
}
fn default_context_limit() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_base_url")]
    pub base_url: String,
    #[serde(default = "default_web_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_web_max_results")]
    pub max_results: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            base_url: default_web_base_url(),
            timeout_secs: default_web_timeout_secs(),
            max_results: default_web_max_results(),
        }
    }
}

fn default_web_base_url() -> String {
    "https://ollama.com/api".to_string()
}
fn default_web_timeout_secs() -> u64 {
    10
}
fn default_web_max_results() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./outputs")
}

/// Load and validate the config at `path`.
///
/// A missing file yields the defaults; a file that exists but does not
/// parse or validate is an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    let chunking = &config.chunking;
    if chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if chunking.overlap >= chunking.chunk_size {
        bail!(
            "chunking.overlap ({}) must be < chunking.chunk_size ({})",
            chunking.overlap,
            chunking.chunk_size
        );
    }
    if chunking.min_chunk_size > chunking.max_chunk_size {
        bail!("chunking.min_chunk_size must be <= chunking.max_chunk_size");
    }
    if chunking.code_max_chunk_size == 0 {
        bail!("chunking.code_max_chunk_size must be > 0");
    }

    // Validate retrieval
    let retrieval = &config.retrieval;
    if retrieval.n_results < 1 {
        bail!("retrieval.n_results must be >= 1");
    }
    if retrieval.final_results > retrieval.initial_results {
        bail!("retrieval.final_results must be <= retrieval.initial_results");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    if !(0.0..=2.0).contains(&config.llm.temperature) {
        bail!("llm.temperature must be in [0.0, 2.0]");
    }

    if config.web.max_results > 10 {
        bail!("web.max_results must be <= 10");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.db.collection, "user_profile");
        assert_eq!(config.chunking.strategy, "default");
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.overlap, 50);
        assert_eq!(config.retrieval.initial_results, 20);
        assert_eq!(config.llm.model, "gemma3");
        assert_eq!(config.web.base_url, "https://ollama.com/api");
        assert!(!config.embedding.is_enabled());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = parse_config("[chunking]\nstrategy = \"semantic\"\n").unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.strategy, "semantic");
        assert_eq!(config.chunking.max_chunk_size, 1000);
        assert_eq!(config.db.path, PathBuf::from("./data/scribe.sqlite"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[chunking\nchunk_size = ").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let config = parse_config("[chunking]\nchunk_size = 100\noverlap = 100\n").unwrap();
        let err = validate(&config).unwrap_err().to_string();
        assert!(err.contains("overlap"));
    }

    #[test]
    fn test_final_results_bounded_by_initial() {
        let config =
            parse_config("[retrieval]\ninitial_results = 5\nfinal_results = 10\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_enabled_embedding_requires_model_and_dims() {
        let config = parse_config("[embedding]\nprovider = \"ollama\"\n").unwrap();
        assert!(validate(&config).is_err());

        let config = parse_config(
            "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
        )
        .unwrap();
        validate(&config).unwrap();
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = parse_config("[embedding]\nprovider = \"openai\"\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_web_max_results_capped() {
        let config = parse_config("[web]\nmax_results = 11\n").unwrap();
        assert!(validate(&config).is_err());
    }
}
