//! Breadth-first, same-host static crawler.
//!
//! The crawler starts from a seed URL, walks links FIFO within the seed's
//! hostname, respects page/depth limits, and normalizes every fetched page
//! into a [`PageRecord`]. A page that keeps failing is logged and skipped;
//! it never aborts the crawl.

use std::collections::{HashSet, VecDeque};
use std::net::IpAddr;

use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use magicpage_shared::{
    CrawlOptions, CrawlTarget, MagicPageError, PageRecord, Result, ScrapeResult,
};

use crate::normalize::{self, NormalizedContent};
use crate::retry::RetryPolicy;

/// Browser-like User-Agent; many small-business hosts reject bot UAs outright.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 5;

// ---------------------------------------------------------------------------
// StaticCrawler
// ---------------------------------------------------------------------------

/// Sequential HTTP crawler: one request in flight at a time.
pub struct StaticCrawler {
    options: CrawlOptions,
    client: Client,
    retry: RetryPolicy,
}

impl StaticCrawler {
    /// Create a new crawler with the given options.
    pub fn new(options: CrawlOptions) -> Result<Self> {
        let client = client_builder(&options)
            .build()
            .map_err(|e| MagicPageError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(options, client))
    }

    fn with_client(options: CrawlOptions, client: Client) -> Self {
        let retry = RetryPolicy::from(&options);
        Self {
            options,
            client,
            retry,
        }
    }

    /// The options this crawler was built with.
    pub fn options(&self) -> &CrawlOptions {
        &self.options
    }

    /// Crawl breadth-first from `seed`.
    ///
    /// Never returns an error: failures are reported through
    /// [`ScrapeResult::error`] with `success = false`.
    #[instrument(skip_all, fields(seed = %seed))]
    pub async fn crawl(&self, seed: &str) -> ScrapeResult {
        let seed_url = match Url::parse(seed) {
            Ok(url) => url,
            Err(e) => return ScrapeResult::failed(format!("invalid seed URL '{seed}': {e}")),
        };
        let Some(base_host) = seed_url.host_str().map(str::to_string) else {
            return ScrapeResult::failed(format!("seed URL has no host: {seed}"));
        };
        if !self.options.allow_private_hosts && is_ssrf_target(&seed_url) {
            warn!(%seed_url, "SSRF protection: blocked");
            return ScrapeResult::failed(format!("refusing to crawl private address: {seed_url}"));
        }

        let max_pages = self.options.max_pages;
        let max_depth = self.options.max_depth;

        info!(max_pages, max_depth, "starting static crawl");

        let mut frontier: VecDeque<CrawlTarget> =
            VecDeque::from([CrawlTarget::new(seed_url.as_str(), 0)]);
        let mut visited: HashSet<String> = HashSet::new();
        let mut items: Vec<PageRecord> = Vec::new();
        let mut last_error: Option<String> = None;
        let mut pages_failed: usize = 0;

        while items.len() < max_pages {
            let Some(target) = frontier.pop_front() else {
                break;
            };

            if visited.contains(&target.url) || target.depth > max_depth {
                continue;
            }
            visited.insert(target.url.clone());

            let Ok(url) = Url::parse(&target.url) else {
                continue;
            };

            match self.fetch_page(&url).await {
                Ok(body) => {
                    let (record, discovered) =
                        build_record(&url, target.depth, &body, &base_host, max_depth, &visited);
                    for link in discovered {
                        frontier.push_back(CrawlTarget::new(link, target.depth + 1));
                    }
                    debug!(
                        url = %record.url,
                        depth = target.depth,
                        links = record.links.len(),
                        "page fetched"
                    );
                    items.push(record);
                }
                Err(e) => {
                    warn!(url = %target.url, error = %e, "page fetch failed, skipping");
                    pages_failed += 1;
                    last_error = Some(e.to_string());
                }
            }
        }

        info!(
            pages_found = items.len(),
            pages_failed,
            frontier_left = frontier.len(),
            "static crawl completed"
        );

        let error = if items.is_empty() {
            Some(last_error.unwrap_or_else(|| "no pages could be fetched".to_string()))
        } else {
            None
        };

        ScrapeResult::from_items(items, error)
    }

    /// Fetch one page body under the retry policy.
    async fn fetch_page(&self, url: &Url) -> Result<String> {
        self.retry
            .run(|attempt| async move {
                debug!(%url, attempt, "fetching page");
                self.fetch_once(url).await
            })
            .await
    }

    /// A single GET. Non-success statuses become [`MagicPageError::HttpStatus`].
    async fn fetch_once(&self, url: &Url) -> Result<String> {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_redirect() {
                    // a refused redirect is not retried
                    let reason = std::error::Error::source(&e)
                        .map(ToString::to_string)
                        .unwrap_or_else(|| e.to_string());
                    MagicPageError::validation(format!("{url}: {reason}"))
                } else {
                    MagicPageError::Network(format!("{url}: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(MagicPageError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| MagicPageError::Network(format!("{url}: body read failed: {e}")))
    }
}

/// HTTP client settings shared by every request of a crawl.
fn client_builder(options: &CrawlOptions) -> ClientBuilder {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(redirect_policy(options.allow_private_hosts))
        .timeout(options.timeout)
}

/// Follow at most [`MAX_REDIRECTS`] hops, refusing private targets unless
/// they are allowed.
fn redirect_policy(allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if !allow_private_hosts && is_ssrf_target(attempt.url()) {
            let message = format!("redirect to private address {} blocked", attempt.url());
            warn!(%message, "SSRF protection: blocked");
            attempt.error(message)
        } else {
            attempt.follow()
        }
    })
}

// ---------------------------------------------------------------------------
// Page assembly
// ---------------------------------------------------------------------------

/// Normalize a fetched body and collect the links to enqueue.
///
/// Links are only discovered below `max_depth`, and only for the seed host.
fn build_record(
    url: &Url,
    depth: u32,
    body: &str,
    base_host: &str,
    max_depth: u32,
    visited: &HashSet<String>,
) -> (PageRecord, Vec<String>) {
    let doc = Html::parse_document(body);
    let NormalizedContent {
        title,
        headings,
        paragraphs,
        lists,
    } = normalize::normalize_document(&doc);

    let links = if depth < max_depth {
        normalize::extract_links(&doc, url)
            .into_iter()
            .filter(|link| !visited.contains(link))
            .filter(|link| is_same_host(link, base_host))
            .collect()
    } else {
        Vec::new()
    };

    let record = PageRecord {
        url: url.to_string(),
        title,
        headings,
        paragraphs,
        lists,
        links: links.clone(),
    };

    (record, links)
}

/// Exact hostname match over http(s); subdomains do not count.
fn is_same_host(link: &str, base_host: &str) -> bool {
    Url::parse(link).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str() == Some(base_host)
    })
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    // Block non-HTTP schemes
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
