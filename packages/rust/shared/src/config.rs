//! Application configuration for Magic Page.
//!
//! User config lives at `~/.magicpage/magicpage.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MagicPageError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "magicpage.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".magicpage";

// ---------------------------------------------------------------------------
// Config structs (matching magicpage.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Static crawl settings.
    #[serde(default)]
    pub crawl: CrawlSection,

    /// Headless browser settings.
    #[serde(default)]
    pub render: RenderSection,

    /// Language model settings.
    #[serde(default)]
    pub llm: LlmSection,
}

/// `[crawl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSection {
    /// Maximum pages fetched per run.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Maximum link depth from the seed URL.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_crawl_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per page before giving up.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// First backoff delay; doubles on each retry.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Allow loopback/private targets (local testing only).
    #[serde(default)]
    pub allow_private_hosts: bool,

    /// Escalate to the browser when the crawl finds this many pages or fewer.
    #[serde(default = "default_single_page_threshold")]
    pub single_page_threshold: usize,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            max_pages: default_max_pages(),
            max_depth: default_max_depth(),
            timeout_ms: default_crawl_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            allow_private_hosts: false,
            single_page_threshold: default_single_page_threshold(),
        }
    }
}

fn default_max_pages() -> usize {
    20
}
fn default_max_depth() -> u32 {
    2
}
fn default_crawl_timeout_ms() -> u64 {
    15_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_single_page_threshold() -> usize {
    1
}

/// `[render]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSection {
    /// Whether the headless browser fallback is used at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Navigation timeout in milliseconds.
    #[serde(default = "default_render_timeout_ms")]
    pub timeout_ms: u64,

    /// Extra wait after a navigation timeout before extracting partial content.
    #[serde(default = "default_timeout_grace_ms")]
    pub timeout_grace_ms: u64,

    /// Wait after navigation for client-side rendering.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Number of viewport-height scrolls to trigger lazy content.
    #[serde(default = "default_scroll_cycles")]
    pub scroll_cycles: u32,

    /// Wait after each scroll.
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,

    /// Maximum links collected from the rendered page.
    #[serde(default = "default_max_links")]
    pub max_links: usize,

    /// Explicit Chrome/Chromium binary; auto-detected when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chrome_path: Option<String>,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_render_timeout_ms(),
            timeout_grace_ms: default_timeout_grace_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            scroll_cycles: default_scroll_cycles(),
            scroll_settle_ms: default_scroll_settle_ms(),
            max_links: default_max_links(),
            chrome_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_render_timeout_ms() -> u64 {
    30_000
}
fn default_timeout_grace_ms() -> u64 {
    5_000
}
fn default_settle_delay_ms() -> u64 {
    2_000
}
fn default_scroll_cycles() -> u32 {
    3
}
fn default_scroll_settle_ms() -> u64 {
    500
}
fn default_max_links() -> usize {
    20
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    /// Whether snippet extraction and knowledge digests use the model.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Chat model identifier.
    #[serde(default = "default_model")]
    pub model: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound on a single model call, in seconds.
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of highlights requested from the model.
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_env: default_api_key_env(),
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout_secs(),
            max_snippets: default_max_snippets(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_timeout_secs() -> u64 {
    60
}
fn default_max_snippets() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Runtime options (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime options for the static crawler.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Maximum pages fetched per run.
    pub max_pages: usize,
    /// Maximum link depth from the seed URL.
    pub max_depth: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per page (at least 1).
    pub retry_attempts: u32,
    /// First backoff delay.
    pub retry_base_delay: Duration,
    /// Allow loopback/private targets.
    pub allow_private_hosts: bool,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for CrawlOptions {
    fn from(config: &AppConfig) -> Self {
        let crawl = &config.crawl;
        Self {
            max_pages: crawl.max_pages,
            max_depth: crawl.max_depth,
            timeout: Duration::from_millis(crawl.timeout_ms),
            retry_attempts: crawl.retry_attempts.max(1),
            retry_base_delay: Duration::from_millis(crawl.retry_base_delay_ms),
            allow_private_hosts: crawl.allow_private_hosts,
        }
    }
}

/// Runtime options for the rendered (headless browser) fetcher.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Navigation timeout.
    pub timeout: Duration,
    /// Extra wait after a navigation timeout.
    pub timeout_grace: Duration,
    /// Wait after navigation.
    pub settle_delay: Duration,
    /// Number of scroll cycles.
    pub scroll_cycles: u32,
    /// Wait after each scroll.
    pub scroll_settle: Duration,
    /// Maximum links collected.
    pub max_links: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RenderOptions {
    fn from(config: &AppConfig) -> Self {
        let render = &config.render;
        Self {
            timeout: Duration::from_millis(render.timeout_ms),
            timeout_grace: Duration::from_millis(render.timeout_grace_ms),
            settle_delay: Duration::from_millis(render.settle_delay_ms),
            scroll_cycles: render.scroll_cycles,
            scroll_settle: Duration::from_millis(render.scroll_settle_ms),
            max_links: render.max_links,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.magicpage/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MagicPageError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.magicpage/magicpage.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MagicPageError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MagicPageError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MagicPageError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| MagicPageError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MagicPageError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the model API key from the env var named in the config.
///
/// Returns `None` when the variable is unset or empty; the pipeline then
/// skips the model and uses its non-LLM fallbacks.
pub fn resolve_api_key(config: &AppConfig) -> Option<String> {
    std::env::var(&config.llm.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
}
