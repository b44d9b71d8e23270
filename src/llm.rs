//! Client for a local Ollama server.
//!
//! [`OllamaClient::connect`] lists the installed models (`GET /api/tags`)
//! and fails with [`LlmError::Unreachable`] if the server does not answer.
//! A missing model is only a warning at connect time; generation against
//! it fails with [`LlmError::ModelUnavailable`].
//!
//! Generation goes through `POST /api/chat`. With `stream: true` the server
//! answers with newline-delimited JSON objects, each carrying a fragment of
//! the assistant message; [`OllamaClient::generate`] forwards every
//! non-empty fragment to a callback as it arrives and returns the full text.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::LlmError;

/// A single generation call.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_message: Option<String>,
    pub temperature: f64,
    /// Maps to Ollama's `num_predict` option.
    pub max_tokens: Option<u32>,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_message: None,
            temperature: 0.7,
            max_tokens: None,
        }
    }

    /// Request with sampling settings taken from `[llm]`.
    pub fn from_config(prompt: impl Into<String>, config: &LlmConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            ..Self::new(prompt)
        }
    }

    pub fn with_system(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

impl<'a> ChatBody<'a> {
    fn new(model: &'a str, request: &'a GenerateRequest, stream: bool) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system_message {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });
        Self {
            model,
            messages,
            stream,
            options: ChatOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// One entry of `GET /api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// Availability of the configured model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub model: String,
    pub host: String,
    pub available: bool,
    pub info: Option<ModelInfo>,
    pub error: Option<String>,
}

/// Installed names match `model` by substring or prefix (`gemma3` matches
/// `gemma3:latest`).
pub fn model_matches(installed: &str, model: &str) -> bool {
    installed.contains(model) || installed.starts_with(model)
}

/// Split complete lines off the front of `buf`, leaving any partial line.
fn drain_lines(buf: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buf.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buf.drain(..=pos).collect();
        let line = String::from_utf8_lossy(&line).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Parse one NDJSON line, returning the fragment and the `done` flag.
fn parse_stream_line(line: &str) -> Result<(String, bool), LlmError> {
    let chunk: ChatChunk =
        serde_json::from_str(line).map_err(|e| LlmError::Decode(e.to_string()))?;
    if let Some(error) = chunk.error {
        return Err(LlmError::Status { status: 200, body: error });
    }
    let fragment = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok((fragment, chunk.done))
}

pub struct OllamaClient {
    host: String,
    model: String,
    client: reqwest::Client,
    model_available: bool,
}

impl OllamaClient {
    /// Connect to `host` and check that `model` is installed.
    pub async fn connect(host: &str, model: &str) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let mut this = Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
            model_available: false,
        };

        let models = this.fetch_tags().await.map_err(|e| match e {
            LlmError::Transport(source) => LlmError::Unreachable {
                host: this.host.clone(),
                source,
            },
            other => other,
        })?;
        tracing::info!(host = %this.host, models = models.len(), "connected to Ollama");

        this.model_available = models.iter().any(|m| model_matches(&m.name, model));
        if this.model_available {
            tracing::info!(model, "model is available");
        } else {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            tracing::warn!(
                model,
                available = ?names,
                "model not found; you may need to run `ollama pull {}`",
                model
            );
        }
        Ok(this)
    }

    /// Connect using `[llm]` settings, optionally overriding the model.
    pub async fn from_config(config: &LlmConfig, model: Option<&str>) -> Result<Self, LlmError> {
        Self::connect(&config.host, model.unwrap_or(&config.model)).await
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Whether the model was listed at connect time.
    pub fn model_available(&self) -> bool {
        self.model_available
    }

    async fn fetch_tags(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(10))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;
        Ok(tags.models)
    }

    async fn post_chat(
        &self,
        request: &GenerateRequest,
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        let body = ChatBody::new(&self.model, request, stream);
        let response = self
            .client
            .post(format!("{}/api/chat", self.host))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND && text.contains("not found") {
            return Err(LlmError::ModelUnavailable {
                model: self.model.clone(),
            });
        }
        Err(LlmError::Status {
            status: status.as_u16(),
            body: text,
        })
    }

    /// Stream a generation, calling `on_fragment` for every piece of text.
    ///
    /// Returns the concatenation of all fragments.
    pub async fn generate<F>(
        &self,
        request: &GenerateRequest,
        mut on_fragment: F,
    ) -> Result<String, LlmError>
    where
        F: FnMut(&str),
    {
        let mut response = self.post_chat(request, true).await?;
        let mut buf: Vec<u8> = Vec::new();
        let mut output = String::new();

        let mut handle = |line: &str, output: &mut String| -> Result<bool, LlmError> {
            let (fragment, done) = parse_stream_line(line)?;
            if !fragment.is_empty() {
                on_fragment(&fragment);
                output.push_str(&fragment);
            }
            Ok(done)
        };

        'stream: while let Some(bytes) = response.chunk().await? {
            buf.extend_from_slice(&bytes);
            for line in drain_lines(&mut buf) {
                if handle(&line, &mut output)? {
                    break 'stream;
                }
            }
        }
        let tail = String::from_utf8_lossy(&buf).trim().to_string();
        if !tail.is_empty() {
            handle(&tail, &mut output)?;
        }

        tracing::debug!(model = %self.model, chars = output.len(), "generation finished");
        Ok(output)
    }

    /// Non-streamed generation.
    pub async fn generate_complete(&self, request: &GenerateRequest) -> Result<String, LlmError> {
        let response = self.post_chat(request, false).await?;
        let text = response.text().await?;
        let (content, _) = parse_stream_line(&text)?;
        Ok(content)
    }

    /// Names of all installed models.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        self.fetch_tags().await
    }

    /// Current availability of the configured model. Errors are reported in
    /// the returned status rather than propagated.
    pub async fn model_status(&self) -> ModelStatus {
        let mut status = ModelStatus {
            model: self.model.clone(),
            host: self.host.clone(),
            available: false,
            info: None,
            error: None,
        };
        match self.fetch_tags().await {
            Ok(models) => {
                status.info = models
                    .into_iter()
                    .find(|m| model_matches(&m.name, &self.model));
                status.available = status.info.is_some();
            }
            Err(e) => {
                tracing::error!(host = %self.host, error = %e, "model status check failed");
                status.error = Some(e.to_string());
            }
        }
        status
    }
}
