//! End-to-end scrape pipeline: URL → static crawl → rendered fallback →
//! model enrichment → envelope.
//!
//! Escalation is a three-state machine (`TryStatic → TryRendered → Done`)
//! with no retries at this level. The caller always gets a well-formed
//! [`OrchestrationEnvelope`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;

use magicpage_crawler::{RenderedFetcher, StaticCrawler};
use magicpage_llm::ChatModel;
use magicpage_shared::{
    AppConfig, EnvelopeStatus, FetchMethod, OrchestrationEnvelope, ScrapeResult, extract_domain,
};

use crate::digest::build_content_digest;
use crate::enrichment::{KnowledgeDigestGenerator, SnippetExtractor};
use crate::format::{
    ERROR_MESSAGE, format_numbered_list, format_rendered_results, format_static_results,
    raw_content,
};

/// Per-run pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Run the model calls when a model is available.
    pub extraction_enabled: bool,
    /// Highlights requested from the model.
    pub max_snippets: usize,
    /// Upper bound on each model call.
    pub llm_timeout: Duration,
    /// A static crawl must find more pages than this to be accepted.
    pub single_page_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            extraction_enabled: config.llm.enabled,
            max_snippets: config.llm.max_snippets,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            single_page_threshold: config.crawl.single_page_threshold,
        }
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each fetch strategy finishes.
    fn fetched(&self, method: FetchMethod, pages: usize);
    /// Called when the pipeline completes.
    fn done(&self, envelope: &OrchestrationEnvelope);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn fetched(&self, _method: FetchMethod, _pages: usize) {}
    fn done(&self, _envelope: &OrchestrationEnvelope) {}
}

/// Whether a static crawl is good enough to skip the browser.
///
/// A single page usually means a client-rendered app whose links only exist
/// after scripts run, so it escalates by default.
pub fn static_result_is_sufficient(result: &ScrapeResult, single_page_threshold: usize) -> bool {
    result.success && result.pages_found > single_page_threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    TryStatic,
    TryRendered,
    Done,
}

/// Model-backed steps, present only when extraction is on and a model exists.
struct Enrichment {
    snippets: SnippetExtractor,
    digest: KnowledgeDigestGenerator,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences the fetchers and the model calls for one URL at a time.
pub struct Orchestrator {
    crawler: StaticCrawler,
    renderer: Option<RenderedFetcher>,
    enrichment: Option<Enrichment>,
    config: PipelineConfig,
}

impl Orchestrator {
    /// `renderer = None` disables the browser fallback; `model = None` (or
    /// `extraction_enabled = false`) uses the raw formatting only.
    pub fn new(
        crawler: StaticCrawler,
        renderer: Option<RenderedFetcher>,
        model: Option<Arc<dyn ChatModel>>,
        config: PipelineConfig,
    ) -> Self {
        let enrichment = model
            .filter(|_| config.extraction_enabled)
            .map(|model| Enrichment {
                snippets: SnippetExtractor::new(Some(Arc::clone(&model)), config.llm_timeout),
                digest: KnowledgeDigestGenerator::new(Some(model), config.llm_timeout),
            });

        Self {
            crawler,
            renderer,
            enrichment,
            config,
        }
    }

    /// Scrape `url` and assemble the envelope.
    #[instrument(skip_all, fields(run_id = %Uuid::now_v7(), url = %url))]
    pub async fn run(&self, url: &Url, progress: &dyn ProgressReporter) -> OrchestrationEnvelope {
        let start = Instant::now();
        info!("starting scrape pipeline");

        let mut stage = Stage::TryStatic;
        let mut static_result = ScrapeResult::failed("static crawl did not run");
        let mut rendered_result: Option<ScrapeResult> = None;

        while stage != Stage::Done {
            debug!(?stage, "pipeline stage");
            stage = match stage {
                Stage::TryStatic => {
                    progress.phase("Crawling site");
                    static_result = self.crawler.crawl(url.as_str()).await;
                    progress.fetched(FetchMethod::Static, static_result.pages_found);

                    if static_result_is_sufficient(&static_result, self.config.single_page_threshold)
                    {
                        Stage::Done
                    } else {
                        info!(
                            pages_found = static_result.pages_found,
                            error = static_result.error.as_deref().unwrap_or(""),
                            "static crawl insufficient, escalating to rendered fetch"
                        );
                        Stage::TryRendered
                    }
                }
                Stage::TryRendered => {
                    rendered_result = Some(match &self.renderer {
                        Some(renderer) => {
                            progress.phase("Rendering page");
                            let result = renderer.render(url.as_str()).await;
                            progress.fetched(FetchMethod::Rendered, result.pages_found);
                            result
                        }
                        None => ScrapeResult::failed("rendered fetch disabled"),
                    });
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
        }

        let envelope = match choose_result(static_result, rendered_result) {
            Ok((method, result)) => self.assemble(method, result, url, progress).await,
            Err(error_details) => {
                warn!(%error_details, "all fetch strategies failed");
                OrchestrationEnvelope {
                    status: EnvelopeStatus::Error,
                    message: ERROR_MESSAGE.to_string(),
                    full_content: String::new(),
                    raw_items: Vec::new(),
                    method_used: None,
                    pages_found: 0,
                    error_details: Some(error_details),
                }
            }
        };

        info!(
            status = ?envelope.status,
            method = envelope.method_used.as_deref().unwrap_or("none"),
            pages_found = envelope.pages_found,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "scrape pipeline completed"
        );
        progress.done(&envelope);

        envelope
    }

    /// Build the success envelope from the chosen fetch.
    async fn assemble(
        &self,
        method: FetchMethod,
        result: ScrapeResult,
        url: &Url,
        progress: &dyn ProgressReporter,
    ) -> OrchestrationEnvelope {
        let mut message: Option<String> = None;
        let mut full_content: Option<String> = None;
        let mut method_used = method.to_string();

        if let Some(enrichment) = &self.enrichment {
            progress.phase("Extracting highlights");
            let digest = build_content_digest(&result.items);
            let domain = extract_domain(url);

            let (extraction, knowledge) = tokio::join!(
                enrichment.snippets.extract_from_digest(
                    &digest,
                    url.as_str(),
                    self.config.max_snippets
                ),
                enrichment
                    .digest
                    .generate_from_digest(&digest, url.as_str(), &domain),
            );

            if extraction.success && !extraction.snippets.is_empty() {
                message = Some(format_numbered_list(&extraction.snippets));
                method_used = format!("{method} + openai");
            } else {
                warn!(
                    error = extraction.error.as_deref().unwrap_or("no snippets"),
                    "using raw display list"
                );
            }

            if knowledge.faq_content.is_none() {
                warn!(
                    error = knowledge.error.as_deref().unwrap_or(""),
                    "using raw knowledge content"
                );
            }
            full_content = knowledge.faq_content;
        }

        let message = message.unwrap_or_else(|| match method {
            FetchMethod::Static => format_static_results(&result.items),
            FetchMethod::Rendered => format_rendered_results(&result.items),
        });
        let full_content = full_content.unwrap_or_else(|| raw_content(&result.items));

        OrchestrationEnvelope {
            status: EnvelopeStatus::Success,
            message,
            full_content,
            pages_found: result.pages_found,
            raw_items: result.items,
            method_used: Some(method_used),
            error_details: None,
        }
    }
}

/// Pick the fetch the envelope is built from.
///
/// `rendered = None` means the static crawl was accepted outright. After an
/// escalation a rendered success wins; a thin but successful static crawl is
/// the next best thing. Otherwise both errors are reported.
fn choose_result(
    static_result: ScrapeResult,
    rendered: Option<ScrapeResult>,
) -> std::result::Result<(FetchMethod, ScrapeResult), String> {
    let Some(rendered) = rendered else {
        return Ok((FetchMethod::Static, static_result));
    };
    if rendered.success {
        return Ok((FetchMethod::Rendered, rendered));
    }
    if static_result.success {
        return Ok((FetchMethod::Static, static_result));
    }

    Err(format!(
        "Static crawl error: {}. Rendered fetch error: {}",
        static_result.error.as_deref().unwrap_or("unknown error"),
        rendered.error.as_deref().unwrap_or("unknown error"),
    ))
}

#[cfg(test)]
mod tests {
    use magicpage_shared::PageRecord;

    use super::*;

    fn pages(n: usize) -> ScrapeResult {
        let items = (0..n)
            .map(|i| PageRecord {
                url: format!("https://acme.test/{i}"),
                ..PageRecord::default()
            })
            .collect();
        ScrapeResult::from_items(items, None)
    }

    #[test]
    fn single_page_is_insufficient_by_default() {
        assert!(!static_result_is_sufficient(&pages(1), 1));
        assert!(static_result_is_sufficient(&pages(2), 1));
        assert!(!static_result_is_sufficient(&ScrapeResult::failed("down"), 1));
    }

    #[test]
    fn threshold_is_tunable() {
        assert!(static_result_is_sufficient(&pages(1), 0));
        assert!(!static_result_is_sufficient(&pages(3), 3));
    }

    #[test]
    fn accepted_static_crawl_is_used() {
        let (method, result) = choose_result(pages(4), None).unwrap();
        assert_eq!(method, FetchMethod::Static);
        assert_eq!(result.pages_found, 4);
    }

    #[test]
    fn rendered_success_beats_thin_static_crawl() {
        let (method, result) = choose_result(pages(1), Some(pages(1))).unwrap();
        assert_eq!(method, FetchMethod::Rendered);
        assert_eq!(result.pages_found, 1);
    }

    #[test]
    fn thin_static_crawl_survives_render_failure() {
        let (method, result) =
            choose_result(pages(1), Some(ScrapeResult::failed("no chrome"))).unwrap();
        assert_eq!(method, FetchMethod::Static);
        assert_eq!(result.pages_found, 1);
    }

    #[test]
    fn both_failures_are_reported() {
        let details = choose_result(
            ScrapeResult::failed("HTTP 500 from https://acme.test/"),
            Some(ScrapeResult::failed("render error: timeout")),
        )
        .unwrap_err();
        assert_eq!(
            details,
            "Static crawl error: HTTP 500 from https://acme.test/. Rendered fetch error: render error: timeout"
        );
    }

    #[test]
    fn pipeline_config_follows_app_config() {
        let mut app = AppConfig::default();
        app.llm.enabled = false;
        app.llm.timeout_secs = 15;
        app.crawl.single_page_threshold = 2;

        let config = PipelineConfig::from(&app);
        assert!(!config.extraction_enabled);
        assert_eq!(config.max_snippets, 10);
        assert_eq!(config.llm_timeout, Duration::from_secs(15));
        assert_eq!(config.single_page_threshold, 2);
    }
}
