//! Page acquisition for Magic Page.
//!
//! This crate provides:
//! - [`engine`]: Breadth-first, same-host static crawler with retry
//! - [`render`]: Single-page fetch through a headless browser
//! - [`normalize`]: HTML to title/headings/paragraphs/lists, shared by both

pub mod engine;
pub mod normalize;
pub mod render;
pub mod retry;

pub use engine::{StaticCrawler, USER_AGENT, is_ssrf_target};
pub use normalize::{
    NormalizedContent, extract_links, normalize, normalize_document,
    normalize_document_without_chrome, normalize_without_chrome,
};
pub use render::{
    BrowserLauncher, BrowserPage, ChromeLauncher, NavigationOutcome, RenderedFetcher,
};
pub use retry::RetryPolicy;
