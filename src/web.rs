//! Ollama hosted web search (`/web_search`) and page fetch (`/web_fetch`).
//!
//! Both endpoints take a JSON body and a `Bearer` API key. The key is
//! passed in explicitly or read from `OLLAMA_API_KEY` when the client is
//! built; there is no shared default client.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::WebConfig;
use crate::error::WebError;

pub const API_KEY_ENV: &str = "OLLAMA_API_KEY";
/// Upper bound the search endpoint accepts for `max_results`.
pub const MAX_SEARCH_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebFetchResult {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<WebSearchResult>,
}

/// Pick the explicit key, else the environment value. Blank keys count as
/// missing.
fn resolve_api_key(explicit: Option<String>, env: Option<String>) -> Result<String, WebError> {
    explicit
        .or(env)
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .ok_or(WebError::MissingApiKey)
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Plain-text listing of search results.
pub fn format_summary(query: &str, results: &[WebSearchResult]) -> String {
    if results.is_empty() {
        return format!("No results found for: {}", query);
    }
    let mut out = format!("Search results for: {}\n{}\n\n", query, "=".repeat(60));
    for (i, result) in results.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, result.title));
        out.push_str(&format!("   URL: {}\n", result.url));
        out.push_str(&format!("   {}...\n\n", truncate_chars(&result.content, 200)));
    }
    out
}

pub struct WebSearchClient {
    api_key: String,
    base_url: String,
    default_max_results: usize,
    client: reqwest::Client,
}

impl WebSearchClient {
    pub fn new(api_key: Option<String>, config: &WebConfig) -> Result<Self, WebError> {
        let api_key = resolve_api_key(api_key, std::env::var(API_KEY_ENV).ok())?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_max_results: config.max_results,
            client,
        })
    }

    pub fn default_max_results(&self) -> usize {
        self.default_max_results
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T, WebError> {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(endpoint, error = %e, "web request failed");
                WebError::Transport(e)
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            tracing::error!(endpoint, "web API rejected the API key");
            return Err(WebError::InvalidApiKey);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(endpoint, status = status.as_u16(), "web API error");
            return Err(WebError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json()
            .await
            .map_err(|e| WebError::Decode(e.to_string()))
    }

    /// Search the web. `max_results` above 10 is clamped.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<WebSearchResult>, WebError> {
        let max_results = if max_results > MAX_SEARCH_RESULTS {
            tracing::warn!(
                max_results,
                "max_results exceeds {}, using {}",
                MAX_SEARCH_RESULTS,
                MAX_SEARCH_RESULTS
            );
            MAX_SEARCH_RESULTS
        } else {
            max_results
        };

        tracing::info!(query, max_results, "web search");
        let response: SearchResponse = self
            .post(
                "web_search",
                json!({ "query": query, "max_results": max_results }),
            )
            .await?;
        tracing::info!(count = response.results.len(), "web search results");
        Ok(response.results)
    }

    /// Fetch a page's title, main content, and outgoing links.
    pub async fn fetch(&self, url: &str) -> Result<WebFetchResult, WebError> {
        tracing::info!(url, "web fetch");
        let result: WebFetchResult = self.post("web_fetch", json!({ "url": url })).await?;
        tracing::info!(title = %result.title, links = result.links.len(), "fetched page");
        Ok(result)
    }

    pub async fn search_and_summarize(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<String, WebError> {
        let results = self.search(query, max_results).await?;
        Ok(format_summary(query, &results))
    }
}
