//! Writing sessions: retrieve personal context, prompt the LLM, save the
//! result.
//!
//! A session resolves the target company (a URL is fetched and its title
//! and description scraped; anything else is used as the name), retrieves
//! `context_limit` chunks for `"{request} {company}"`, streams the
//! generated text through a caller-supplied callback, and writes it to
//! `{company}_{request}_{YYYYMMDD_HHMMSS}.txt` under the output directory.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use regex::Regex;
use scraper::{Html, Selector};

use crate::config::{Config, LlmConfig};
use crate::llm::{GenerateRequest, OllamaClient};
use crate::models::QueryResult;
use crate::retrieval::RetrievalEngine;
use crate::web::WebSearchClient;

pub const SYSTEM_MESSAGE: &str = "You are a professional writing assistant that helps create \
high-quality cover letters, cold emails, and application responses.

Your task is to:
1. Use the provided personal context (resume, work history, skills) to highlight relevant qualifications
2. Tailor the content to the specific company and role
3. Write in a professional, confident, and personalized tone
4. Be specific and concrete rather than generic
5. Keep the content focused and concise
6. Ensure proper formatting and structure

Always write from the first person perspective and make the content feel authentic and personalized.";

const CLOSING_INSTRUCTION: &str =
    "Please generate the requested professional content based on the above information.";
const FILENAME_PART_MAX: usize = 30;
const DESCRIPTION_MAX: usize = 500;
const RESEARCH_RESULTS: usize = 3;

static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_-]").expect("valid filename regex"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompanyInfo {
    pub name: String,
    pub description: String,
    pub url: Option<String>,
}

pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://") || input.starts_with("www.")
}

fn normalize_url(input: &str) -> String {
    if input.starts_with("http") {
        input.to_string()
    } else {
        format!("https://{}", input)
    }
}

fn first_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid css selector")
}

/// Title, meta description, and leading paragraphs of a company page.
///
/// The description is the `description` (or `og:description`) meta tag,
/// replaced by the text of the first three paragraphs when that is longer.
pub fn parse_company_page(html: &str, url: &str, fallback_name: &str) -> CompanyInfo {
    let document = Html::parse_document(html);

    let name = document
        .select(&selector("title"))
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_name.to_string());

    let mut description = document
        .select(&selector(r#"meta[name="description"]"#))
        .next()
        .or_else(|| {
            document
                .select(&selector(r#"meta[property="og:description"]"#))
                .next()
        })
        .and_then(|m| m.value().attr("content"))
        .map(|c| c.trim().to_string())
        .unwrap_or_default();

    let paragraphs: Vec<String> = document
        .select(&selector("p"))
        .take(3)
        .map(|p| p.text().collect::<String>().trim().to_string())
        .collect();
    let text = paragraphs.join(" ");
    if !text.is_empty() && text.chars().count() > description.chars().count() {
        description = format!("{}...", first_chars(&text, DESCRIPTION_MAX));
    }

    CompanyInfo {
        name,
        description,
        url: Some(url.to_string()),
    }
}

/// Resolve a company name or URL. Fetch failures fall back to the input.
pub async fn resolve_company(http: &reqwest::Client, input: &str) -> CompanyInfo {
    let fallback = CompanyInfo {
        name: input.to_string(),
        ..Default::default()
    };
    if !is_url(input) {
        return fallback;
    }

    let url = normalize_url(input);
    tracing::info!(url = %url, "fetching company page");
    let html = async {
        http.get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
    .await;

    match html {
        Ok(html) => parse_company_page(&html, &url, input),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "could not fetch company info");
            fallback
        }
    }
}

/// Assemble the user prompt from the company, request, and retrieved context.
pub fn build_prompt(
    company: &CompanyInfo,
    request: &str,
    context: &QueryResult,
    research: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !company.name.is_empty() {
        parts.push(format!("Company: {}", company.name));
    }
    if !company.description.is_empty() {
        parts.push(format!("Company Description: {}", company.description));
    }
    if let Some(url) = &company.url {
        parts.push(format!("Company Website: {}", url));
    }
    if let Some(research) = research {
        parts.push(format!("\nCompany Research:\n{}", research.trim_end()));
    }

    parts.push(format!("\nRequest: {}", request));

    if !context.is_empty() {
        parts.push("\nRelevant Personal Context:".to_string());
        for chunk in &context.chunks {
            parts.push(format!("\nFrom {}:", chunk.filename()));
            parts.push(chunk.text.clone());
        }
    }

    parts.push(format!("\n{}", CLOSING_INSTRUCTION));
    parts.join("\n")
}

/// Lowercase, replace anything outside `[a-zA-Z0-9_-]` with `_`, cap length.
pub fn sanitize_filename_part(s: &str) -> String {
    let lower = s.to_lowercase();
    let safe = UNSAFE_FILENAME_CHARS.replace_all(&lower, "_");
    safe.chars().take(FILENAME_PART_MAX).collect()
}

pub fn artifact_filename(company: &str, request: &str, at: &DateTime<Local>) -> String {
    format!(
        "{}_{}_{}.txt",
        sanitize_filename_part(company),
        sanitize_filename_part(request),
        at.format("%Y%m%d_%H%M%S")
    )
}

pub fn render_artifact(company: &str, request: &str, at: &DateTime<Local>, body: &str) -> String {
    format!(
        "Company: {}\nRequest: {}\nGenerated: {}\n{}\n\n{}",
        company,
        request,
        at.format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60),
        body
    )
}

/// Write a generated sample under `dir`, creating it if needed.
pub fn save_artifact(dir: &Path, company: &str, request: &str, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    let now = Local::now();
    let path = dir.join(artifact_filename(company, request, &now));
    std::fs::write(&path, render_artifact(company, request, &now, body))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Result of one [`WritingSession::run`].
#[derive(Debug)]
pub struct WritingOutcome {
    pub company: CompanyInfo,
    pub context: QueryResult,
    pub content: String,
    pub saved_to: PathBuf,
}

pub struct WritingSession {
    retrieval: RetrievalEngine,
    llm: OllamaClient,
    web: Option<WebSearchClient>,
    http: reqwest::Client,
    llm_config: LlmConfig,
    output_dir: PathBuf,
    context_limit: usize,
}

impl WritingSession {
    pub fn new(retrieval: RetrievalEngine, llm: OllamaClient, config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.web.timeout_secs))
            .build()?;
        Ok(Self {
            retrieval,
            llm,
            web: None,
            http,
            llm_config: config.llm.clone(),
            output_dir: config.output.dir.clone(),
            context_limit: config.llm.context_limit,
        })
    }

    /// Add web research on the company to the prompt.
    pub fn with_web(mut self, web: WebSearchClient) -> Self {
        self.web = Some(web);
        self
    }

    pub fn with_context_limit(mut self, context_limit: usize) -> Self {
        self.context_limit = context_limit;
        self
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    async fn research(&self, company: &CompanyInfo) -> Option<String> {
        let web = self.web.as_ref()?;
        if company.url.is_some() {
            return None;
        }
        match web.search_and_summarize(&company.name, RESEARCH_RESULTS).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(company = %company.name, error = %e, "company research failed");
                None
            }
        }
    }

    /// Generate and save one writing sample, streaming text to `on_fragment`.
    pub async fn run<F>(&self, company: &str, request: &str, on_fragment: F) -> Result<WritingOutcome>
    where
        F: FnMut(&str),
    {
        let company = resolve_company(&self.http, company).await;
        let context = self
            .retrieval
            .query(&format!("{} {}", request, company.name), self.context_limit)
            .await;
        tracing::info!(
            company = %company.name,
            chunks = context.chunks.len(),
            "retrieved personal context"
        );

        let research = self.research(&company).await;
        let prompt = build_prompt(&company, request, &context, research.as_deref());
        let generate =
            GenerateRequest::from_config(prompt, &self.llm_config).with_system(SYSTEM_MESSAGE);
        let content = self.llm.generate(&generate, on_fragment).await?;

        let saved_to = save_artifact(&self.output_dir, &company.name, request, &content)?;
        tracing::info!(path = %saved_to.display(), "saved writing sample");

        Ok(WritingOutcome {
            company,
            context,
            content,
            saved_to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Metadata, RetrievedChunk, SourceIntegrity};
    use chrono::TimeZone;
    use serde_json::json;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://acme.dev"));
        assert!(is_url("www.acme.dev"));
        assert!(!is_url("Acme Corp"));
        assert_eq!(normalize_url("www.acme.dev"), "https://www.acme.dev");
    }

    #[test]
    fn test_parse_company_page() {
        let html = r#"<html><head><title> Acme Robotics </title>
            <meta name="description" content="We build robots."></head>
            <body><p>Hi.</p></body></html>"#;
        let info = parse_company_page(html, "https://acme.dev", "acme.dev");
        assert_eq!(info.name, "Acme Robotics");
        assert_eq!(info.description, "We build robots.");
        assert_eq!(info.url.as_deref(), Some("https://acme.dev"));
    }

    #[test]
    fn test_parse_company_page_prefers_longer_paragraphs() {
        let html = r#"<html><head>
            <meta property="og:description" content="Short."></head>
            <body><p>Acme builds warehouse robots.</p><p>Founded in 2010.</p></body></html>"#;
        let info = parse_company_page(html, "https://acme.dev", "acme.dev");
        assert_eq!(info.name, "acme.dev");
        assert_eq!(
            info.description,
            "Acme builds warehouse robots. Founded in 2010...."
        );
    }

    #[tokio::test]
    async fn test_resolve_company_plain_name() {
        let info = resolve_company(&reqwest::Client::new(), "Acme Corp").await;
        assert_eq!(info.name, "Acme Corp");
        assert!(info.description.is_empty());
        assert!(info.url.is_none());
    }

    #[test]
    fn test_build_prompt() {
        let mut metadata = Metadata::new();
        metadata.insert("filename".into(), json!("resume.txt"));
        let context = QueryResult {
            query: "q".into(),
            chunks: vec![RetrievedChunk {
                id: "c1".into(),
                text: "Led the Rust rewrite.".into(),
                metadata,
                score: None,
                cluster: None,
            }],
            source_integrity: SourceIntegrity::Preserved,
            cluster_info: None,
        };
        let company = CompanyInfo {
            name: "Acme".into(),
            ..Default::default()
        };
        let prompt = build_prompt(&company, "cover letter", &context, None);
        assert_eq!(
            prompt,
            "Company: Acme\n\nRequest: cover letter\n\nRelevant Personal Context:\n\
             \nFrom resume.txt:\nLed the Rust rewrite.\n\n\
             Please generate the requested professional content based on the above information."
        );

        let empty = QueryResult::empty("q", SourceIntegrity::Preserved);
        let prompt = build_prompt(&company, "email", &empty, Some("1. Acme\n"));
        assert!(prompt.contains("\nCompany Research:\n1. Acme\n"));
        assert!(!prompt.contains("Relevant Personal Context"));
    }

    #[test]
    fn test_artifact_naming() {
        assert_eq!(sanitize_filename_part("Acme, Inc."), "acme__inc_");
        assert_eq!(sanitize_filename_part(&"x".repeat(50)).len(), 30);
        assert_eq!(sanitize_filename_part("Zürich AG"), "z_rich_ag");
        assert_eq!(
            artifact_filename("Acme Corp", "Cover letter!", &at()),
            "acme_corp_cover_letter__20240305_140709.txt"
        );
    }

    #[test]
    fn test_render_and_save_artifact() {
        let text = render_artifact("Acme", "email", &at(), "Hello.");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Company: Acme");
        assert_eq!(lines[1], "Request: email");
        assert_eq!(lines[2], "Generated: 2024-03-05 14:07:09");
        assert_eq!(lines[3], "=".repeat(60));
        assert_eq!(lines[5], "Hello.");

        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("outputs");
        let path = save_artifact(&out, "Acme", "email", "Hello.").unwrap();
        assert!(path.starts_with(&out));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("acme_email_"));
        assert!(std::fs::read_to_string(&path).unwrap().ends_with("Hello."));
    }
}
