//! Seed URL normalization and domain helpers.

use url::Url;

use crate::error::{MagicPageError, Result};

/// Turn user input into an absolute seed URL.
///
/// Input without an `http`/`https` prefix gets `http://` prepended, matching
/// what visitors type into the landing form ("acme.com").
pub fn normalize_seed_url(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(MagicPageError::validation("website URL is required"));
    }

    let candidate = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    };

    let url = Url::parse(&candidate)
        .map_err(|e| MagicPageError::validation(format!("invalid website URL '{trimmed}': {e}")))?;

    if url.host_str().is_none_or(str::is_empty) {
        return Err(MagicPageError::validation(format!(
            "website URL has no host: {trimmed}"
        )));
    }

    Ok(url)
}

/// Hostname without a leading `www.` (e.g. `www.acme.com` → `acme.com`).
pub fn extract_domain(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}
