//! Content normalizer shared by the static and rendered fetchers.
//!
//! Both fetchers feed raw HTML through these functions so downstream
//! consumers see identical fields regardless of how the page was loaded.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));
static HEADING_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1, h2, h3, h4").expect("valid selector"));
static PARAGRAPH_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p").expect("valid selector"));
static LIST_ITEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul li, ol li").expect("valid selector"));
static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Elements whose text never counts as page content.
const CHROME_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "aside", "noscript",
];

/// Exclusive character-length bounds per field.
pub const HEADING_BOUNDS: (usize, usize) = (3, 200);
pub const PARAGRAPH_BOUNDS: (usize, usize) = (20, 500);
pub const LIST_ITEM_BOUNDS: (usize, usize) = (5, 300);

/// Structured fields extracted from one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContent {
    pub title: String,
    pub headings: Vec<String>,
    pub paragraphs: Vec<String>,
    pub lists: Vec<String>,
}

/// Extract title, headings, paragraphs and list items from raw HTML.
pub fn normalize(raw_html: &str) -> NormalizedContent {
    normalize_document(&Html::parse_document(raw_html))
}

/// [`normalize`] over an already parsed document.
pub fn normalize_document(doc: &Html) -> NormalizedContent {
    extract(doc, false)
}

/// Like [`normalize`], but ignores anything inside script, style, nav,
/// footer, header, aside or noscript elements.
pub fn normalize_without_chrome(raw_html: &str) -> NormalizedContent {
    normalize_document_without_chrome(&Html::parse_document(raw_html))
}

/// [`normalize_without_chrome`] over an already parsed document.
pub fn normalize_document_without_chrome(doc: &Html) -> NormalizedContent {
    extract(doc, true)
}

/// Resolve every `a[href]` in `doc` against `base`. Malformed hrefs are dropped,
/// fragments are stripped.
pub fn extract_links(doc: &Html, base: &Url) -> Vec<String> {
    doc.select(&ANCHOR_SEL)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| base.join(href.trim()).ok())
        .map(|mut resolved| {
            resolved.set_fragment(None);
            resolved.to_string()
        })
        .collect()
}

fn extract(doc: &Html, skip_chrome: bool) -> NormalizedContent {
    let title = doc
        .select(&TITLE_SEL)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    NormalizedContent {
        title,
        headings: collect_texts(doc, &HEADING_SEL, HEADING_BOUNDS, skip_chrome),
        paragraphs: collect_texts(doc, &PARAGRAPH_SEL, PARAGRAPH_BOUNDS, skip_chrome),
        lists: collect_texts(doc, &LIST_ITEM_SEL, LIST_ITEM_BOUNDS, skip_chrome),
    }
}

fn collect_texts(
    doc: &Html,
    selector: &Selector,
    (min, max): (usize, usize),
    skip_chrome: bool,
) -> Vec<String> {
    doc.select(selector)
        .filter(|el| !(skip_chrome && inside_chrome(el)))
        .map(|el| element_text(&el))
        .filter(|text| within_bounds(text, min, max))
        .collect()
}

/// Text of `el` with every whitespace run collapsed to a single space.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn within_bounds(text: &str, min: usize, max: usize) -> bool {
    let len = text.chars().count();
    len > min && len < max
}

fn inside_chrome(el: &ElementRef<'_>) -> bool {
    std::iter::once(**el)
        .chain(el.ancestors())
        .filter_map(|node| node.value().as_element())
        .any(|element| CHROME_TAGS.contains(&element.name()))
}
