//! Single-page fetch through a headless browser.
//!
//! Used when a site only exposes its content after client-side rendering.
//! The browser is driven through the [`BrowserLauncher`] / [`BrowserPage`]
//! seam; [`ChromeLauncher`] is the production implementation on top of
//! `headless_chrome`. Every browser that gets launched is closed exactly
//! once, on success and on failure.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use headless_chrome::{Browser, LaunchOptions, Tab};
use scraper::Html;
use tracing::{debug, info, instrument, warn};
use url::Url;

use magicpage_shared::{MagicPageError, PageRecord, RenderOptions, Result, ScrapeResult};

use crate::normalize::{self, NormalizedContent};

/// How a navigation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationOutcome {
    /// The page finished loading within the timeout.
    Settled,
    /// The load did not settle in time; the document may be partial.
    TimedOut,
}

/// One open browser page. Implementations are blocking.
pub trait BrowserPage: Send {
    /// Navigate and wait for the page to settle.
    ///
    /// Errors are reserved for navigations that never produced a document;
    /// a slow load is reported as [`NavigationOutcome::TimedOut`].
    fn navigate(&mut self, url: &str) -> Result<NavigationOutcome>;

    /// Scroll down by one viewport height.
    fn scroll_viewport(&mut self) -> Result<()>;

    /// Serialized DOM of the current document.
    fn content(&mut self) -> Result<String>;

    /// URL of the current document, after redirects.
    fn current_url(&mut self) -> Result<String>;

    /// Release the page and its browser.
    fn close(&mut self) -> Result<()>;
}

/// Starts a fresh, isolated browser with one blank page.
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, options: &RenderOptions) -> Result<Box<dyn BrowserPage>>;
}

// ---------------------------------------------------------------------------
// RenderedFetcher
// ---------------------------------------------------------------------------

/// Fetches and normalizes one page through a browser.
pub struct RenderedFetcher {
    launcher: Arc<dyn BrowserLauncher>,
    options: RenderOptions,
}

impl RenderedFetcher {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: RenderOptions) -> Self {
        Self { launcher, options }
    }

    /// Fetcher backed by a local Chrome/Chromium install.
    pub fn chrome(options: RenderOptions, chrome_path: Option<PathBuf>) -> Self {
        Self::new(Arc::new(ChromeLauncher::new(chrome_path)), options)
    }

    /// Render `url` and return at most one page.
    ///
    /// Never returns an error: failures are reported through
    /// [`ScrapeResult::error`] with `success = false`.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn render(&self, url: &str) -> ScrapeResult {
        let launcher = Arc::clone(&self.launcher);
        let options = self.options.clone();
        let target = url.to_string();

        // headless_chrome is synchronous; keep it off the async workers.
        let joined =
            tokio::task::spawn_blocking(move || render_page(launcher.as_ref(), &options, &target))
                .await;

        match joined {
            Ok(Ok(record)) => {
                info!(
                    headings = record.headings.len(),
                    paragraphs = record.paragraphs.len(),
                    links = record.links.len(),
                    "rendered fetch completed"
                );
                ScrapeResult::from_items(vec![record], None)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "rendered fetch failed");
                ScrapeResult::failed(e.to_string())
            }
            Err(e) => ScrapeResult::failed(format!("render task failed: {e}")),
        }
    }
}

/// Drive one browser session from launch to close.
fn render_page(
    launcher: &dyn BrowserLauncher,
    options: &RenderOptions,
    url: &str,
) -> Result<PageRecord> {
    let seed = Url::parse(url)
        .map_err(|e| MagicPageError::validation(format!("invalid URL '{url}': {e}")))?;

    let mut session = BrowserSession::new(launcher.launch(options)?);

    if session.page().navigate(seed.as_str())? == NavigationOutcome::TimedOut {
        warn!(
            grace_ms = options.timeout_grace.as_millis() as u64,
            "navigation did not settle, continuing with partial document"
        );
        pause(options.timeout_grace);
    }
    pause(options.settle_delay);

    for cycle in 0..options.scroll_cycles {
        if let Err(e) = session.page().scroll_viewport() {
            debug!(cycle, error = %e, "scroll failed, stopping scroll cycles");
            break;
        }
        pause(options.scroll_settle);
    }

    let html = session.page().content()?;
    let current = session
        .page()
        .current_url()
        .ok()
        .and_then(|u| Url::parse(&u).ok())
        .unwrap_or_else(|| seed.clone());

    session.close();

    Ok(build_record(&seed, &current, &html, options.max_links))
}

fn build_record(seed: &Url, current: &Url, html: &str, max_links: usize) -> PageRecord {
    let doc = Html::parse_document(html);
    let NormalizedContent {
        title,
        headings,
        paragraphs,
        lists,
    } = normalize::normalize_document_without_chrome(&doc);

    let links = normalize::extract_links(&doc, current)
        .into_iter()
        .filter(|link| {
            Url::parse(link).is_ok_and(|u| {
                matches!(u.scheme(), "http" | "https") && u.host_str() == seed.host_str()
            })
        })
        .take(max_links)
        .collect();

    PageRecord {
        url: seed.to_string(),
        title,
        headings,
        paragraphs,
        lists,
        links,
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

// ---------------------------------------------------------------------------
// Session guard
// ---------------------------------------------------------------------------

/// Owns a launched page; closes it on the success path or on drop.
struct BrowserSession {
    page: Box<dyn BrowserPage>,
    closed: bool,
}

impl BrowserSession {
    fn new(page: Box<dyn BrowserPage>) -> Self {
        Self {
            page,
            closed: false,
        }
    }

    fn page(&mut self) -> &mut dyn BrowserPage {
        self.page.as_mut()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.page.close() {
            warn!(error = %e, "failed to close browser");
        }
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.close();
    }
}

// ---------------------------------------------------------------------------
// Chrome
// ---------------------------------------------------------------------------

/// Launches headless Chrome via the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    chrome_path: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(chrome_path: Option<PathBuf>) -> Self {
        Self { chrome_path }
    }
}

impl BrowserLauncher for ChromeLauncher {
    fn launch(&self, options: &RenderOptions) -> Result<Box<dyn BrowserPage>> {
        let args: Vec<&OsStr> = vec![
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-setuid-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
            OsStr::new("--incognito"),
            OsStr::new("--no-first-run"),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: true,
            window_size: Some((1920, 1080)),
            path: self.chrome_path.clone(),
            args,
            ..Default::default()
        })
        .map_err(render_err("launch browser"))?;

        let tab = browser.new_tab().map_err(render_err("open tab"))?;
        tab.set_default_timeout(options.timeout);

        debug!("browser launched");

        Ok(Box::new(ChromePage {
            browser: Some(browser),
            tab,
        }))
    }
}

struct ChromePage {
    browser: Option<Browser>,
    tab: Arc<Tab>,
}

impl BrowserPage for ChromePage {
    fn navigate(&mut self, url: &str) -> Result<NavigationOutcome> {
        self.tab.navigate_to(url).map_err(render_err("navigate"))?;

        match self.tab.wait_until_navigated() {
            Ok(_) => Ok(NavigationOutcome::Settled),
            Err(e) => {
                debug!(error = %e, "wait for navigation ended early");
                Ok(NavigationOutcome::TimedOut)
            }
        }
    }

    fn scroll_viewport(&mut self) -> Result<()> {
        self.tab
            .evaluate("window.scrollBy(0, window.innerHeight)", false)
            .map_err(render_err("scroll"))?;
        Ok(())
    }

    fn content(&mut self) -> Result<String> {
        self.tab.get_content().map_err(render_err("read content"))
    }

    fn current_url(&mut self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    fn close(&mut self) -> Result<()> {
        let closed = self.tab.close(true).map_err(render_err("close tab"));
        // Dropping the browser kills the Chrome process.
        self.browser.take();
        closed.map(|_| ())
    }
}

fn render_err<E: std::fmt::Display>(action: &'static str) -> impl Fn(E) -> MagicPageError {
    move |e| MagicPageError::Render(format!("failed to {action}: {e}"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        scrolls: AtomicUsize,
        closes: AtomicUsize,
        visited: Mutex<Vec<String>>,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Failure {
        None,
        Launch,
        Navigate,
        Content,
    }

    struct FakeLauncher {
        html: String,
        outcome: NavigationOutcome,
        failure: Failure,
        counters: Arc<Counters>,
    }

    impl FakeLauncher {
        fn new(html: impl Into<String>) -> Self {
            Self {
                html: html.into(),
                outcome: NavigationOutcome::Settled,
                failure: Failure::None,
                counters: Arc::default(),
            }
        }
    }

    struct FakePage {
        html: String,
        outcome: NavigationOutcome,
        failure: Failure,
        counters: Arc<Counters>,
    }

    impl BrowserLauncher for FakeLauncher {
        fn launch(&self, _options: &RenderOptions) -> Result<Box<dyn BrowserPage>> {
            if self.failure == Failure::Launch {
                return Err(MagicPageError::Render("no chrome binary".into()));
            }
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakePage {
                html: self.html.clone(),
                outcome: self.outcome,
                failure: self.failure,
                counters: Arc::clone(&self.counters),
            }))
        }
    }

    impl BrowserPage for FakePage {
        fn navigate(&mut self, url: &str) -> Result<NavigationOutcome> {
            self.counters.visited.lock().unwrap().push(url.to_string());
            if self.failure == Failure::Navigate {
                return Err(MagicPageError::Render("net::ERR_NAME_NOT_RESOLVED".into()));
            }
            Ok(self.outcome)
        }

        fn scroll_viewport(&mut self) -> Result<()> {
            self.counters.scrolls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn content(&mut self) -> Result<String> {
            if self.failure == Failure::Content {
                return Err(MagicPageError::Render("target closed".into()));
            }
            Ok(self.html.clone())
        }

        fn current_url(&mut self) -> Result<String> {
            Ok(self.counters.visited.lock().unwrap().last().cloned().unwrap_or_default())
        }

        fn close(&mut self) -> Result<()> {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn instant_options() -> RenderOptions {
        RenderOptions {
            timeout: Duration::from_secs(1),
            timeout_grace: Duration::ZERO,
            settle_delay: Duration::ZERO,
            scroll_cycles: 3,
            scroll_settle: Duration::ZERO,
            max_links: 20,
        }
    }

    fn spa_html() -> String {
        let internal: String = (0..25)
            .map(|i| format!(r#"<a href="/product/{i}">Product {i}</a>"#))
            .collect();
        format!(
            r#"<html><head><title>Acme Studio</title><script>var x = "ignored";</script></head>
            <body>
              <header><h1>Header banner text</h1></header>
              <nav><ul><li>Navigation entry</li></ul></nav>
              <main>
                <h2>Custom furniture</h2>
                <p>Every piece is built by hand in our riverside workshop.</p>
                <ul><li>Solid oak tables</li></ul>
                <a href="https://social.example.net/acme">Follow us</a>
                {internal}
              </main>
              <footer><p>Copyright Acme Studio, all rights reserved.</p></footer>
            </body></html>"#
        )
    }

    fn fetcher(launcher: FakeLauncher) -> (RenderedFetcher, Arc<Counters>) {
        let counters = Arc::clone(&launcher.counters);
        (
            RenderedFetcher::new(Arc::new(launcher), instant_options()),
            counters,
        )
    }

    #[tokio::test]
    async fn renders_and_strips_chrome() {
        let (fetcher, counters) = fetcher(FakeLauncher::new(spa_html()));

        let result = fetcher.render("https://acme.test/").await;

        assert!(result.success);
        assert_eq!(result.pages_found, 1);
        let page = &result.items[0];
        assert_eq!(page.url, "https://acme.test/");
        assert_eq!(page.title, "Acme Studio");
        assert_eq!(page.headings, vec!["Custom furniture".to_string()]);
        assert_eq!(
            page.paragraphs,
            vec!["Every piece is built by hand in our riverside workshop.".to_string()]
        );
        assert_eq!(page.lists, vec!["Solid oak tables".to_string()]);

        assert_eq!(counters.scrolls.load(Ordering::SeqCst), 3);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn links_are_same_host_and_capped() {
        let (fetcher, _) = fetcher(FakeLauncher::new(spa_html()));

        let result = fetcher.render("https://acme.test/").await;
        let links = &result.items[0].links;

        assert_eq!(links.len(), 20);
        assert_eq!(links[0], "https://acme.test/product/0");
        assert!(links.iter().all(|l| l.starts_with("https://acme.test/")));
    }

    #[tokio::test]
    async fn navigation_timeout_keeps_partial_content() {
        let mut launcher = FakeLauncher::new(spa_html());
        launcher.outcome = NavigationOutcome::TimedOut;
        let (fetcher, counters) = fetcher(launcher);

        let result = fetcher.render("https://acme.test/").await;

        assert!(result.success);
        assert_eq!(result.items[0].title, "Acme Studio");
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn navigation_error_fails_and_closes_once() {
        let mut launcher = FakeLauncher::new(spa_html());
        launcher.failure = Failure::Navigate;
        let (fetcher, counters) = fetcher(launcher);

        let result = fetcher.render("https://acme.test/").await;

        assert!(!result.success);
        assert_eq!(result.pages_found, 0);
        assert!(result.error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
        assert_eq!(counters.scrolls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn content_error_fails_and_closes_once() {
        let mut launcher = FakeLauncher::new(spa_html());
        launcher.failure = Failure::Content;
        let (fetcher, counters) = fetcher(launcher);

        let result = fetcher.render("https://acme.test/").await;

        assert!(!result.success);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn launch_failure_reports_error() {
        let mut launcher = FakeLauncher::new(spa_html());
        launcher.failure = Failure::Launch;
        let (fetcher, counters) = fetcher(launcher);

        let result = fetcher.render("https://acme.test/").await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("no chrome binary"));
        assert_eq!(counters.launches.load(Ordering::SeqCst), 0);
        assert_eq!(counters.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_url_never_launches() {
        let (fetcher, counters) = fetcher(FakeLauncher::new(spa_html()));

        let result = fetcher.render("::not a url::").await;

        assert!(!result.success);
        assert_eq!(counters.launches.load(Ordering::SeqCst), 0);
    }
}
