//! Bounded-size text digest of normalized pages, used as model input.

use magicpage_shared::PageRecord;

/// Character budget for the digest, leaving room for prompt and response.
pub const DIGEST_BUDGET_CHARS: usize = 8000;

const MAX_HEADINGS: usize = 10;
const MAX_LIST_ITEMS: usize = 15;
const MAX_PARAGRAPHS: usize = 5;

// Budget charged on top of the raw text for each labelled part.
const TITLE_OVERHEAD: usize = 20;
const PARAGRAPH_OVERHEAD: usize = 10;

/// Build the digest shared by both model calls.
///
/// Per page: `PAGE TITLE:`, `HEADINGS:` (first 10, ` | `-joined),
/// `KEY POINTS:` (first 15 list items), then up to 5 `CONTENT:` paragraphs
/// while the budget allows. Paragraph sampling stops mid-page once the next
/// paragraph would overrun; page iteration stops once the budget is reached.
/// Parts are separated by blank lines. Empty input yields an empty string.
pub fn build_content_digest(items: &[PageRecord]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut total = 0usize;

    for page in items {
        if !page.title.is_empty() {
            parts.push(format!("PAGE TITLE: {}", page.title));
            total += char_len(&page.title) + TITLE_OVERHEAD;
        }

        if !page.headings.is_empty() {
            let text = format!("HEADINGS: {}", join_first(&page.headings, MAX_HEADINGS));
            total += char_len(&text);
            parts.push(text);
        }

        if !page.lists.is_empty() {
            let text = format!("KEY POINTS: {}", join_first(&page.lists, MAX_LIST_ITEMS));
            total += char_len(&text);
            parts.push(text);
        }

        for paragraph in page.paragraphs.iter().take(MAX_PARAGRAPHS) {
            let len = char_len(paragraph);
            if total + len > DIGEST_BUDGET_CHARS {
                break;
            }
            parts.push(format!("CONTENT: {paragraph}"));
            total += len + PARAGRAPH_OVERHEAD;
        }

        if total >= DIGEST_BUDGET_CHARS {
            break;
        }
    }

    parts.join("\n\n")
}

fn join_first(values: &[String], limit: usize) -> String {
    values[..values.len().min(limit)].join(" | ")
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(title: &str) -> PageRecord {
        PageRecord {
            url: format!("https://acme.test/{}", title.to_lowercase()),
            title: title.to_string(),
            ..PageRecord::default()
        }
    }

    #[test]
    fn empty_items_give_empty_digest() {
        assert_eq!(build_content_digest(&[]), "");
        assert_eq!(build_content_digest(&[PageRecord::default()]), "");
    }

    #[test]
    fn sections_are_labelled_and_joined() {
        let record = PageRecord {
            headings: vec!["Our services".into(), "Pricing".into()],
            lists: vec!["Free delivery".into(), "Lifetime warranty".into()],
            paragraphs: vec!["We build furniture by hand in Oregon.".into()],
            ..page("Acme")
        };

        assert_eq!(
            build_content_digest(&[record]),
            "PAGE TITLE: Acme\n\n\
             HEADINGS: Our services | Pricing\n\n\
             KEY POINTS: Free delivery | Lifetime warranty\n\n\
             CONTENT: We build furniture by hand in Oregon."
        );
    }

    #[test]
    fn headings_lists_and_paragraphs_are_capped() {
        let record = PageRecord {
            headings: (0..12).map(|i| format!("Heading {i}")).collect(),
            lists: (0..20).map(|i| format!("Item {i}")).collect(),
            paragraphs: (0..8).map(|i| format!("Paragraph number {i} with text.")).collect(),
            ..page("Acme")
        };

        let digest = build_content_digest(&[record]);

        assert!(digest.contains("Heading 9"));
        assert!(!digest.contains("Heading 10"));
        assert!(digest.contains("Item 14"));
        assert!(!digest.contains("Item 15"));
        assert_eq!(digest.matches("CONTENT: ").count(), 5);
    }

    #[test]
    fn budget_stops_mid_page_and_across_pages() {
        let pages: Vec<PageRecord> = (1..=12)
            .map(|i| PageRecord {
                paragraphs: vec!["x".repeat(450); 5],
                ..page(&format!("Page {i}"))
            })
            .collect();

        let digest = build_content_digest(&pages);

        // three full pages, two paragraphs of page 4, then titles only until
        // page 7's title overhead pushes the total past the budget
        assert_eq!(digest.matches("CONTENT: ").count(), 17);
        assert!(digest.contains("PAGE TITLE: Page 7"));
        assert!(!digest.contains("PAGE TITLE: Page 8"));
    }
}
