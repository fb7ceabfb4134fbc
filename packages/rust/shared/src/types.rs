//! Core domain types for the scrape pipeline.

use serde::{Deserialize, Serialize};

/// Hard cap on knowledge-base content handed to the external platform.
pub const MAX_KB_CONTENT_CHARS: usize = 4000;

// ---------------------------------------------------------------------------
// Crawl records
// ---------------------------------------------------------------------------

/// A queued crawl position: absolute URL plus link distance from the seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTarget {
    pub url: String,
    pub depth: u32,
}

impl CrawlTarget {
    pub fn new(url: impl Into<String>, depth: u32) -> Self {
        Self {
            url: url.into(),
            depth,
        }
    }
}

/// Normalized content of one fetched page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// URL the page was requested at.
    pub url: String,
    /// `<title>` text, empty when the document has none.
    pub title: String,
    /// `h1`–`h4` texts that passed the length filter, in document order.
    pub headings: Vec<String>,
    /// `p` texts that passed the length filter.
    pub paragraphs: Vec<String>,
    /// `li` texts that passed the length filter.
    pub lists: Vec<String>,
    /// Same-host absolute URLs discovered on this page.
    pub links: Vec<String>,
}

/// Output of one fetcher invocation.
///
/// Build it through [`ScrapeResult::from_items`] or [`ScrapeResult::failed`]
/// so that `pages_found` always equals `items.len()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    pub success: bool,
    pub pages_found: usize,
    pub items: Vec<PageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeResult {
    /// A finished fetch; successful iff at least one page was produced.
    pub fn from_items(items: Vec<PageRecord>, error: Option<String>) -> Self {
        Self {
            success: !items.is_empty(),
            pages_found: items.len(),
            items,
            error,
        }
    }

    /// A fetch that produced nothing.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            pages_found: 0,
            items: Vec::new(),
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Model outputs
// ---------------------------------------------------------------------------

/// Highlights extracted by the model for display during the wait.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub snippets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            snippets: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Structured FAQ document for the external knowledge base.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestResult {
    pub success: bool,
    /// Capped at [`MAX_KB_CONTENT_CHARS`]; absent when generation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq_content: Option<String>,
    /// Character count of the model output before truncation.
    pub original_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DigestResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            faq_content: None,
            original_length: 0,
            error: Some(error.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Fetch strategy that produced the pipeline's pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMethod {
    /// Plain HTTP crawl with HTML parsing.
    Static,
    /// Single page loaded in a headless browser.
    Rendered,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Rendered => "rendered",
        }
    }
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// The pipeline's external output, serialized as JSON by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationEnvelope {
    pub status: EnvelopeStatus,
    /// Numbered display list, one `"{n}. {text}"` per line.
    pub message: String,
    /// Knowledge digest or raw fallback, at most [`MAX_KB_CONTENT_CHARS`].
    #[serde(rename = "fullContent")]
    pub full_content: String,
    #[serde(rename = "rawItems")]
    pub raw_items: Vec<PageRecord>,
    /// `None` when every strategy failed.
    pub method_used: Option<String>,
    pub pages_found: usize,
    pub error_details: Option<String>,
}

impl OrchestrationEnvelope {
    pub fn is_success(&self) -> bool {
        self.status == EnvelopeStatus::Success
    }
}

/// Cut `text` to at most `max_chars` characters, on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
