//! Numbered-list display formatting and the non-model fallbacks.

use std::sync::LazyLock;

use regex::Regex;

use magicpage_shared::{MAX_KB_CONTENT_CHARS, PageRecord, truncate_chars};

/// Terminal message when every fetch strategy failed.
pub const ERROR_MESSAGE: &str =
    "1. Failed to scrape website content\n2. Please check if the URL is accessible";

/// Display list used when a fetch succeeded but yielded nothing displayable.
pub const EMPTY_CONTENT_MESSAGE: &str = "1. Website content extracted successfully";

const MAX_DISPLAY_ITEMS: usize = 10;

static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.").expect("valid regex"));

// ---------------------------------------------------------------------------
// Numbered lists
// ---------------------------------------------------------------------------

/// `"1. a\n2. b\n..."`.
pub fn format_numbered_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse a model's numbered-list answer.
///
/// Lines starting with `<digits>.` have that prefix stripped. When no line
/// matches, every non-blank line is taken as-is.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    let numbered: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter_map(|line| NUMBERED_LINE.find(line).map(|m| line[m.end()..].trim()))
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    if !numbered.is_empty() {
        return numbered;
    }

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Raw display lists
// ---------------------------------------------------------------------------

/// Display list for a multi-page static crawl: each page's title, its first
/// three new headings and a shortened first paragraph.
pub fn format_static_results(items: &[PageRecord]) -> String {
    let mut lines: Vec<String> = Vec::new();

    for page in items {
        if !page.title.is_empty() {
            lines.push(format!("Page: {}", page.title));
        }
        for heading in page.headings.iter().take(3) {
            push_unique(&mut lines, heading.clone());
        }
        if let Some(paragraph) = page.paragraphs.first() {
            lines.push(shorten(paragraph, 200));
        }
    }

    numbered_or_placeholder(&lines)
}

/// Display list for a rendered page: title, up to five distinct headings,
/// up to eight list items, then short paragraphs while the list is thin.
pub fn format_rendered_results(items: &[PageRecord]) -> String {
    let mut lines: Vec<String> = Vec::new();

    for page in items {
        if !page.title.is_empty() {
            lines.push(format!("Website: {}", page.title));
        }

        let mut distinct: Vec<&String> = Vec::new();
        for heading in &page.headings {
            if !distinct.contains(&heading) {
                distinct.push(heading);
            }
        }
        lines.extend(distinct.into_iter().take(5).cloned());

        for item in page.lists.iter().take(8) {
            push_unique(&mut lines, item.clone());
        }

        if lines.len() < 8 {
            for paragraph in page.paragraphs.iter().take(5) {
                push_unique(&mut lines, shorten(paragraph, 150));
            }
        }
    }

    numbered_or_placeholder(&lines)
}

/// Plain concatenation of every page, capped for the knowledge base.
pub fn raw_content(items: &[PageRecord]) -> String {
    let pages: Vec<String> = items
        .iter()
        .map(|page| {
            let mut parts = vec![
                page.title.clone(),
                page.url.clone(),
                page.headings.join("\n"),
                page.paragraphs.join("\n"),
                page.lists.join("\n"),
            ];
            parts.retain(|part| !part.is_empty());
            parts.join("\n")
        })
        .collect();

    truncate_chars(&pages.join("\n\n"), MAX_KB_CONTENT_CHARS).to_string()
}

fn numbered_or_placeholder(lines: &[String]) -> String {
    if lines.is_empty() {
        return EMPTY_CONTENT_MESSAGE.to_string();
    }
    format_numbered_list(&lines[..lines.len().min(MAX_DISPLAY_ITEMS)])
}

fn push_unique(lines: &mut Vec<String>, line: String) {
    if !lines.contains(&line) {
        lines.push(line);
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        text.to_string()
    }
}
