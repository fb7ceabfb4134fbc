//! Model-backed enrichment: display highlights and the knowledge digest.
//!
//! Both tasks are soft-failing. A missing model, an empty digest, a timeout
//! or an API error is reported inside the result value and never as `Err`,
//! so the pipeline can always fall back to its raw formatting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use magicpage_llm::{ChatModel, ChatRequest, Message};
use magicpage_shared::{
    DigestResult, ExtractionResult, MAX_KB_CONTENT_CHARS, MagicPageError, PageRecord, Result,
    truncate_chars,
};

use crate::digest::build_content_digest;
use crate::format::parse_numbered_list;

/// Appended when the knowledge digest had to be cut.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated for optimization]";

const SNIPPET_SYSTEM_PROMPT: &str = "You are an expert at analyzing business websites and extracting the most compelling and meaningful information. You provide concise, informative summaries that highlight what makes a business unique and valuable.";

const DIGEST_SYSTEM_PROMPT: &str = "You are an expert at creating structured FAQ documents for chatbot knowledge bases. Extract factual information only - never invent details. Keep responses concise and well-organized.";

const SNIPPET_TEMPERATURE: f32 = 0.3;
const SNIPPET_MAX_TOKENS: u32 = 500;
const DIGEST_TEMPERATURE: f32 = 0.2;
const DIGEST_MAX_TOKENS: u32 = 1500;

// ---------------------------------------------------------------------------
// Snippets
// ---------------------------------------------------------------------------

/// Asks the model for a short numbered list of highlights.
#[derive(Clone)]
pub struct SnippetExtractor {
    model: Option<Arc<dyn ChatModel>>,
    timeout: Duration,
}

impl SnippetExtractor {
    pub fn new(model: Option<Arc<dyn ChatModel>>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Digest `items` and extract up to `max_snippets` highlights.
    pub async fn extract_snippets(
        &self,
        items: &[PageRecord],
        source_url: &str,
        max_snippets: usize,
    ) -> ExtractionResult {
        let digest = build_content_digest(items);
        self.extract_from_digest(&digest, source_url, max_snippets).await
    }

    /// Same as [`extract_snippets`](Self::extract_snippets) over a prebuilt digest.
    #[instrument(skip_all, fields(url = %source_url, max_snippets = max_snippets))]
    pub async fn extract_from_digest(
        &self,
        digest: &str,
        source_url: &str,
        max_snippets: usize,
    ) -> ExtractionResult {
        let Some(model) = &self.model else {
            return ExtractionResult::failed("language model not configured");
        };
        if digest.is_empty() {
            return ExtractionResult::failed("no content available for analysis");
        }

        let request = ChatRequest::new(model.model())
            .message(Message::system(SNIPPET_SYSTEM_PROMPT))
            .message(Message::user(snippet_prompt(digest, source_url, max_snippets)))
            .temperature(SNIPPET_TEMPERATURE)
            .max_tokens(SNIPPET_MAX_TOKENS);

        let start = Instant::now();
        match complete_within(model.as_ref(), request, self.timeout).await {
            Ok(text) => {
                let mut snippets = parse_numbered_list(text.trim());
                snippets.truncate(max_snippets);
                info!(
                    snippets = snippets.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "snippet extraction completed"
                );
                ExtractionResult {
                    success: true,
                    snippets,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "snippet extraction failed");
                ExtractionResult::failed(e.to_string())
            }
        }
    }
}

fn snippet_prompt(digest: &str, source_url: &str, max_snippets: usize) -> String {
    format!(
        "Analyze the following website content from {source_url} and extract {max_snippets} of the most interesting and meaningful points about this business, product, or service.

Website Content:
{digest}

Instructions:
- Extract the most compelling and informative points
- Focus on what makes this business unique, their key services/products, value propositions
- Keep each point concise but informative (1-2 sentences max)
- Prioritize actionable information a potential customer would want to know
- Return ONLY the numbered list, no additional commentary
- Format: Return exactly {max_snippets} items in the format \"1. Point one\\n2. Point two\\n...\" etc.

Return the {max_snippets} most interesting points as a numbered list:"
    )
}

// ---------------------------------------------------------------------------
// Knowledge digest
// ---------------------------------------------------------------------------

/// Asks the model for a structured FAQ document for the knowledge base.
#[derive(Clone)]
pub struct KnowledgeDigestGenerator {
    model: Option<Arc<dyn ChatModel>>,
    timeout: Duration,
}

impl KnowledgeDigestGenerator {
    pub fn new(model: Option<Arc<dyn ChatModel>>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn generate_digest(
        &self,
        items: &[PageRecord],
        source_url: &str,
        domain: &str,
    ) -> DigestResult {
        let digest = build_content_digest(items);
        self.generate_from_digest(&digest, source_url, domain).await
    }

    #[instrument(skip_all, fields(url = %source_url, domain = %domain))]
    pub async fn generate_from_digest(
        &self,
        digest: &str,
        source_url: &str,
        domain: &str,
    ) -> DigestResult {
        let Some(model) = &self.model else {
            return DigestResult::failed("language model not configured");
        };
        if digest.is_empty() {
            return DigestResult::failed("no content available for analysis");
        }

        let request = ChatRequest::new(model.model())
            .message(Message::system(DIGEST_SYSTEM_PROMPT))
            .message(Message::user(digest_prompt(digest, source_url, domain)))
            .temperature(DIGEST_TEMPERATURE)
            .max_tokens(DIGEST_MAX_TOKENS);

        match complete_within(model.as_ref(), request, self.timeout).await {
            Ok(text) => {
                let text = text.trim();
                let original_length = text.chars().count();
                let faq_content = cap_with_marker(text);
                info!(
                    original_length,
                    truncated = original_length > MAX_KB_CONTENT_CHARS,
                    "knowledge digest generated"
                );
                DigestResult {
                    success: true,
                    faq_content: Some(faq_content),
                    original_length,
                    error: None,
                }
            }
            Err(e) => {
                warn!(error = %e, "knowledge digest failed");
                DigestResult::failed(e.to_string())
            }
        }
    }
}

fn digest_prompt(digest: &str, source_url: &str, domain: &str) -> String {
    format!(
        "Analyze this website content and create a structured FAQ document for a chatbot knowledge base.

WEBSITE: {source_url}
DOMAIN: {domain}

CONTENT:
{digest}

Create a structured FAQ with the following sections. Extract ONLY information found in the content - do not make up details. If information is not available, write \"Not specified on website\".

FORMAT (use exactly this structure):

=== BUSINESS INFORMATION ===
Business Name: [Extract from content]
Website: {source_url}
Domain: {domain}

=== CONTACT INFORMATION ===
Phone: [Extract if found]
Email: [Extract if found]
Address: [Extract if found]
Hours: [Extract if found]

=== ABOUT THE BUSINESS ===
[2-3 sentences describing what this business does]

=== PRODUCTS & SERVICES ===
[List the main products or services offered, one per line with bullet points]

=== KEY FEATURES & BENEFITS ===
[List 3-5 key selling points or unique features]

=== FREQUENTLY ASKED QUESTIONS ===
Q: What does {domain} do?
A: [Brief answer based on content]

Q: What services/products does {domain} offer?
A: [Brief answer listing main offerings]

Q: How can I contact {domain}?
A: [Contact info if available, otherwise \"Visit {source_url} for contact details\"]

Keep the total response under {MAX_KB_CONTENT_CHARS} characters. Be concise but informative."
    )
}

/// Cap `text` so that text plus [`TRUNCATION_MARKER`] fits the knowledge base limit.
fn cap_with_marker(text: &str) -> String {
    if text.chars().count() <= MAX_KB_CONTENT_CHARS {
        return text.to_string();
    }
    let keep = MAX_KB_CONTENT_CHARS - TRUNCATION_MARKER.chars().count();
    format!("{}{TRUNCATION_MARKER}", truncate_chars(text, keep))
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

async fn complete_within(
    model: &dyn ChatModel,
    request: ChatRequest,
    timeout: Duration,
) -> Result<String> {
    tokio::time::timeout(timeout, model.complete(request))
        .await
        .map_err(|_| {
            MagicPageError::Llm(format!("model call timed out after {}s", timeout.as_secs()))
        })?
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Replays a fixed answer and records every request.
    struct ScriptedModel {
        answer: std::result::Result<String, String>,
        delay: Duration,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(text.to_string()),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Err(message.to_string()),
                delay: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, request: ChatRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            tokio::time::sleep(self.delay).await;
            match &self.answer {
                Ok(text) => Ok(text.clone()),
                Err(message) => Err(MagicPageError::Llm(message.clone())),
            }
        }

        fn model(&self) -> &str {
            "gpt-4o-mini"
        }
    }

    fn pages() -> Vec<PageRecord> {
        vec![PageRecord {
            url: "https://acme.test/".into(),
            title: "Acme Furniture".into(),
            headings: vec!["Handmade tables".into()],
            paragraphs: vec!["We build every table by hand in our Oregon workshop.".into()],
            lists: vec!["Free local delivery".into()],
            links: Vec::new(),
        }]
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn snippets_are_parsed_and_capped() {
        let model = ScriptedModel::answering("1. Handmade tables\n2. Oregon workshop\n3. Free delivery");
        let extractor = SnippetExtractor::new(Some(model.clone()), timeout());

        let result = extractor.extract_snippets(&pages(), "https://acme.test/", 2).await;

        assert!(result.success);
        assert_eq!(result.snippets, vec!["Handmade tables", "Oregon workshop"]);

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.max_tokens, Some(500));
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.messages[0].role, "system");
        assert!(request.messages[1].content.contains("from https://acme.test/ and extract 2"));
        assert!(request.messages[1].content.contains("PAGE TITLE: Acme Furniture"));
    }

    #[tokio::test]
    async fn unnumbered_answer_uses_every_line() {
        let model = ScriptedModel::answering("Acme builds tables.\n\nThey deliver for free.\n");
        let extractor = SnippetExtractor::new(Some(model), timeout());

        let result = extractor.extract_snippets(&pages(), "https://acme.test/", 10).await;

        assert!(result.success);
        assert_eq!(result.snippets, vec!["Acme builds tables.", "They deliver for free."]);
    }

    #[tokio::test]
    async fn snippet_failures_are_soft() {
        let unconfigured = SnippetExtractor::new(None, timeout());
        let result = unconfigured.extract_snippets(&pages(), "https://acme.test/", 10).await;
        assert!(!result.success);
        assert!(result.snippets.is_empty());

        let model = ScriptedModel::answering("1. never sent");
        let empty = SnippetExtractor::new(Some(model.clone()), timeout())
            .extract_snippets(&[], "https://acme.test/", 10)
            .await;
        assert!(!empty.success);
        assert!(model.requests.lock().unwrap().is_empty());

        let failing = SnippetExtractor::new(Some(ScriptedModel::failing("boom")), timeout())
            .extract_snippets(&pages(), "https://acme.test/", 10)
            .await;
        assert!(!failing.success);
        assert!(failing.error.unwrap().contains("boom"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let model = Arc::new(ScriptedModel {
            answer: Ok("1. late".into()),
            delay: Duration::from_secs(120),
            requests: Mutex::new(Vec::new()),
        });
        let extractor = SnippetExtractor::new(Some(model), Duration::from_secs(60));

        let result = extractor.extract_snippets(&pages(), "https://acme.test/", 10).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out after 60s"));
    }

    #[tokio::test]
    async fn digest_is_returned_with_length() {
        let faq = "=== BUSINESS INFORMATION ===\nBusiness Name: Acme Furniture";
        let model = ScriptedModel::answering(&format!("  {faq}\n"));
        let generator = KnowledgeDigestGenerator::new(Some(model.clone()), timeout());

        let result = generator
            .generate_digest(&pages(), "https://acme.test/", "acme.test")
            .await;

        assert!(result.success);
        assert_eq!(result.faq_content.as_deref(), Some(faq));
        assert_eq!(result.original_length, faq.chars().count());

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, Some(1500));
        assert_eq!(requests[0].temperature, Some(0.2));
        assert!(requests[0].messages[1].content.contains("Q: What does acme.test do?"));
    }

    #[tokio::test]
    async fn long_digest_is_cut_with_marker() {
        let long = "a".repeat(MAX_KB_CONTENT_CHARS + 500);
        let generator =
            KnowledgeDigestGenerator::new(Some(ScriptedModel::answering(&long)), timeout());

        let result = generator
            .generate_digest(&pages(), "https://acme.test/", "acme.test")
            .await;

        let content = result.faq_content.unwrap();
        assert_eq!(result.original_length, MAX_KB_CONTENT_CHARS + 500);
        assert_eq!(content.chars().count(), MAX_KB_CONTENT_CHARS);
        assert!(content.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn digest_failure_leaves_content_absent() {
        let generator =
            KnowledgeDigestGenerator::new(Some(ScriptedModel::failing("503 upstream")), timeout());

        let result = generator
            .generate_digest(&pages(), "https://acme.test/", "acme.test")
            .await;

        assert!(!result.success);
        assert!(result.faq_content.is_none());
        assert!(result.error.unwrap().contains("503 upstream"));
    }

    #[test]
    fn content_at_limit_is_untouched() {
        let exact = "b".repeat(MAX_KB_CONTENT_CHARS);
        assert_eq!(cap_with_marker(&exact), exact);
    }
}
