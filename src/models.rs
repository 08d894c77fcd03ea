//! Core data models used throughout Docsift.
//!
//! These types represent the pages, documents, conversation entries, and
//! video results that flow through the extraction and analysis pipeline.

use serde::{Deserialize, Serialize};

/// One unit of extracted text with a 1-based ordinal.
///
/// Every extractor produces an ordered, contiguous sequence of pages.
/// Unpaginated sources (images, Word files, plain text) always produce
/// exactly one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub content: String,
}

impl Page {
    pub fn new(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            page_number,
            content: content.into(),
        }
    }
}

/// Join pages into a single string with page-boundary markers.
///
/// The markers let [`split_pages`] reconstitute the original page
/// structure from a flattened persisted record.
pub fn full_text(pages: &[Page]) -> String {
    pages
        .iter()
        .map(|p| format!("--- Page {} ---\n{}", p.page_number, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Re-split a flattened document body into pages by its boundary markers.
///
/// Exact inverse of [`full_text`]. A non-empty body without any markers
/// becomes a single page 1 so callers always get pages back for stored
/// content.
pub fn split_pages(body: &str) -> Vec<Page> {
    let mut pages = Vec::new();
    let mut current: Option<(u32, Vec<&str>)> = None;

    for line in body.split('\n') {
        if let Some(num) = parse_marker(line) {
            if let Some((n, lines)) = current.take() {
                pages.push(Page::new(n, trim_trailing_separator(lines)));
            }
            current = Some((num, Vec::new()));
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((n, lines)) = current {
        pages.push(Page::new(n, lines.join("\n")));
    }

    if pages.is_empty() && !body.is_empty() {
        pages.push(Page::new(1, body));
    }
    pages
}

/// Flattened body with the page-boundary markers removed.
///
/// Prompts get this form; the marker-annotated form is a persistence
/// detail and would otherwise leak into analysis input.
pub fn plain_text(body: &str) -> String {
    split_pages(body)
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse a `--- Page N ---` marker line, returning the page number.
fn parse_marker(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("--- Page ")?;
    let num = rest.strip_suffix(" ---")?;
    num.parse().ok()
}

/// Page bodies are joined with a blank separator line; drop it when
/// re-splitting so the round trip is exact.
fn trim_trailing_separator(mut lines: Vec<&str>) -> String {
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

/// Role of a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One message in a per-(owner, document) conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
}

impl ChatEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Persisted document row.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub owner_id: String,
    pub filename: String,
    /// Classified document type (e.g. "Rent Agreement").
    pub kind: String,
    /// Flattened full text with page markers, truncated before persistence.
    pub body: String,
    pub page_count: i64,
    pub created_at: i64,
}

/// Listing shape for a document: metadata only, no body.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub kind: String,
    pub page_count: i64,
    pub created_at: i64,
}

/// A single result from the video search capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoResult {
    pub id: String,
    pub title: String,
    pub description: String,
    pub thumbnail: String,
    pub channel: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_text_marks_every_page() {
        let pages = vec![Page::new(1, "alpha"), Page::new(2, "beta")];
        let text = full_text(&pages);
        assert_eq!(text, "--- Page 1 ---\nalpha\n\n--- Page 2 ---\nbeta");
    }

    #[test]
    fn split_pages_round_trips() {
        let pages = vec![
            Page::new(1, "first page\nwith two lines"),
            Page::new(2, ""),
            Page::new(3, "third"),
        ];
        let restored = split_pages(&full_text(&pages));
        assert_eq!(restored, pages);
    }

    #[test]
    fn split_pages_without_markers_is_single_page() {
        let pages = split_pages("plain body, never flattened from pages");
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].content, "plain body, never flattened from pages");
    }

    #[test]
    fn split_pages_empty_body_is_empty() {
        assert!(split_pages("").is_empty());
    }

    #[test]
    fn plain_text_strips_boundary_markers() {
        let pages = vec![Page::new(1, "alpha"), Page::new(2, "beta")];
        let plain = plain_text(&full_text(&pages));
        assert_eq!(plain, "alpha\n\nbeta");
        assert!(!plain.contains("--- Page"));
    }
}
