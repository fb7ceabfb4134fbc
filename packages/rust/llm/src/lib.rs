//! Chat-model access for Magic Page.
//!
//! The pipeline only talks to a [`ChatModel`]; [`OpenAiChat`] is the
//! production implementation against an OpenAI-compatible
//! `/chat/completions` endpoint.

pub mod client;
pub mod types;

pub use client::{DEFAULT_BASE_URL, OpenAiChat};
pub use types::{ChatRequest, Message};

use async_trait::async_trait;
use magicpage_shared::Result;

/// A text-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `request` and return the first choice's text.
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    /// Model identifier requests should use.
    fn model(&self) -> &str;
}
