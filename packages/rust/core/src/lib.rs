//! Core pipeline orchestration and domain logic for Magic Page.
//!
//! This crate ties together the static crawler, the rendered fallback and
//! the model-backed enrichment into one scrape run ([`Orchestrator::run`]).

pub mod digest;
pub mod enrichment;
pub mod format;
pub mod pipeline;

pub use digest::build_content_digest;
pub use enrichment::{KnowledgeDigestGenerator, SnippetExtractor};
pub use format::{format_numbered_list, parse_numbered_list};
pub use pipeline::{
    Orchestrator, PipelineConfig, ProgressReporter, SilentProgress, static_result_is_sufficient,
};
