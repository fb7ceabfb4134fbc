//! Shared types, error model, and configuration for Magic Page.
//!
//! This crate is the foundation depended on by all other Magic Page crates.
//! It provides:
//! - [`MagicPageError`]: the unified error type
//! - Domain types ([`PageRecord`], [`ScrapeResult`], [`OrchestrationEnvelope`], ...)
//! - Configuration ([`AppConfig`], runtime option structs, config loading)
//! - Seed URL normalization and domain helpers

pub mod config;
pub mod error;
pub mod types;
pub mod url_utils;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CrawlOptions, CrawlSection, LlmSection, RenderOptions, RenderSection, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{MagicPageError, Result};
pub use types::{
    CrawlTarget, DigestResult, EnvelopeStatus, ExtractionResult, FetchMethod,
    MAX_KB_CONTENT_CHARS, OrchestrationEnvelope, PageRecord, ScrapeResult, truncate_chars,
};
pub use url_utils::{extract_domain, normalize_seed_url};
