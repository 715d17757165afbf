//! Content fetching and candidate enrichment.
//!
//! A candidate that carries a `url` but no description gets one built from
//! the fetched page. Fetch failures never propagate: they turn into an
//! inline error description.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use lazy_static::lazy_static;
use ranksys_core::Candidate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Prefix of the description given to a candidate whose URL failed.
pub const FETCH_FAILED_PREFIX: &str = "[URL fetch failed]";

/// How much of a page could be extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Success,
    Partial,
    Error,
}

/// Extracted page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedContent {
    pub url: String,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<String>,
    /// Plain text, bounded in length.
    pub content: String,
    pub status: FetchStatus,
    /// Failure reason when `status` is `Error`.
    pub error: Option<String>,
}

impl FetchedContent {
    /// A failed fetch.
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            description: None,
            author: None,
            content: String::new(),
            status: FetchStatus::Error,
            error: Some(error.into()),
        }
    }

    /// Description text to attach to a candidate.
    pub fn to_description(&self) -> String {
        match self.status {
            FetchStatus::Success => {
                let mut lines = vec![format!("Title: {}", self.title)];
                if let Some(summary) = self.description.as_deref().filter(|d| !d.is_empty()) {
                    lines.push(format!("Summary: {}", summary));
                }
                if let Some(author) = self.author.as_deref().filter(|a| !a.is_empty()) {
                    lines.push(format!("Author: {}", author));
                }
                lines.push(format!("Content: {}", self.content));
                lines.push(format!("Source: {}", self.url));
                lines.join("\n")
            }
            FetchStatus::Partial if !self.content.is_empty() => self.content.clone(),
            FetchStatus::Partial => self.title.clone(),
            FetchStatus::Error => format!(
                "{} {}",
                FETCH_FAILED_PREFIX,
                self.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// Resolves a URL into page content. Never fails; errors are reported in
/// the returned [`FetchedContent`].
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> FetchedContent;
}

/// Fetches pages over HTTP and extracts text from the HTML.
#[derive(Debug, Clone)]
pub struct HttpContentFetcher {
    client: reqwest::Client,
    max_content_chars: usize,
}

impl HttpContentFetcher {
    pub fn new(timeout: Duration, max_content_chars: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ranksys/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_content_chars,
        }
    }

    async fn fetch_html(&self, url: &str) -> Result<String, String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            }
        })?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        response.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> FetchedContent {
        match self.fetch_html(url).await {
            Ok(html) => {
                let content = extract_page(url, &html, self.max_content_chars);
                debug!(url = %url, status = ?content.status, chars = content.content.len(), "Fetched page");
                content
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch URL");
                FetchedContent::failed(url, e)
            }
        }
    }
}

lazy_static! {
    static ref TITLE_RE: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap();
    static ref META_RE: Regex = Regex::new(
        r#"(?is)<meta\s+[^>]*?(?:name|property)\s*=\s*["']([^"']+)["'][^>]*?content\s*=\s*(?:"([^"]*)"|'([^']*)')"#
    )
    .unwrap();
    // elements whose text is never shown
    static ref HIDDEN_RE: Regex = Regex::new(
        r"(?is)<(script|style|noscript|head|title|nav|footer)\b[^>]*>.*?</(script|style|noscript|head|title|nav|footer)>"
    )
    .unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]+>").unwrap();
}

fn meta_content(html: &str, name: &str) -> Option<String> {
    META_RE
        .captures_iter(html)
        .find(|c| c[1].eq_ignore_ascii_case(name))
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| collapse_whitespace(m.as_str()))
        .filter(|v| !v.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pull title, meta fields and visible text out of an HTML document.
pub fn extract_page(url: &str, html: &str, max_content_chars: usize) -> FetchedContent {
    let title = TITLE_RE
        .captures(html)
        .map(|c| collapse_whitespace(&c[1]))
        .unwrap_or_default();
    let description =
        meta_content(html, "description").or_else(|| meta_content(html, "og:description"));
    let author = meta_content(html, "author");

    let visible = HIDDEN_RE.replace_all(html, " ");
    let text = TAG_RE.replace_all(&visible, " ");
    let content: String = collapse_whitespace(&decode_entities(&text))
        .chars()
        .take(max_content_chars)
        .collect();

    let status = if content.is_empty() {
        FetchStatus::Partial
    } else {
        FetchStatus::Success
    };

    FetchedContent {
        url: url.to_string(),
        title: if title.is_empty() { url.to_string() } else { title },
        description,
        author,
        content,
        status,
        error: None,
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Attach fetched content to a candidate as its description.
pub fn apply_fetched(candidate: &mut Candidate, fetched: &FetchedContent) {
    if fetched.status == FetchStatus::Error {
        warn!(candidate_id = %candidate.id, url = %fetched.url, "Enrichment failed");
    }
    candidate.info.description = Some(fetched.to_description());
}

/// Synthetic candidate `url_<index>` for a fetched page, named by its title.
pub fn url_candidate(index: usize, url: &str, fetched: &FetchedContent) -> Candidate {
    let mut candidate = Candidate::from_url(index, url);
    if fetched.status != FetchStatus::Error && !fetched.title.is_empty() {
        candidate.name = fetched.title.clone();
    }
    candidate.info.description = Some(fetched.to_description());
    candidate
}

/// Back-fill descriptions for candidates that have a URL and none yet.
///
/// At most `concurrency` fetches run at once; the output keeps input order.
pub async fn enrich_candidates(
    fetcher: &dyn ContentFetcher,
    candidates: Vec<Candidate>,
    concurrency: usize,
) -> Vec<Candidate> {
    stream::iter(candidates)
        .map(|mut candidate| async move {
            if candidate.needs_enrichment() {
                if let Some(url) = candidate.url().map(str::to_string) {
                    let fetched = fetcher.fetch(&url).await;
                    apply_fetched(&mut candidate, &fetched);
                }
            }
            candidate
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Build synthetic `url_<i>` candidates from URLs, one fetch per URL.
pub async fn url_candidates(
    fetcher: &dyn ContentFetcher,
    urls: &[String],
    concurrency: usize,
) -> Vec<Candidate> {
    stream::iter(urls.iter().cloned().enumerate())
        .map(|(idx, url)| async move {
            let fetched = fetcher.fetch(&url).await;
            url_candidate(idx, &url, &fetched)
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
