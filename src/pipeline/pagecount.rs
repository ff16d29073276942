//! Page counting: the billable quantity of each selected file.
//!
//! Images are always one page. PDFs go through a fallback chain that never
//! fails outward:
//!
//! 1. **Parse** with lopdf ([`crate::pipeline::parser`]) and read the page
//!    tree. Authoritative for well-formed documents.
//! 2. **Heuristics** over the first 100 KiB, decoded lossily as text:
//!    a. the first `/Count N` token with N ≥ 1;
//!    b. the number of `/Type /Page` markers (`/Type /Pages` excluded).
//! 3. **Default** to one page.
//!
//! The heuristics are approximate. Nested page trees, outline `/Count`
//! entries and compressed object streams can all skew them.

use crate::pipeline::parser;
use crate::pipeline::validate::FileKind;
use bytes::Bytes;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// How much of a PDF the heuristics look at by default.
pub const DEFAULT_HEURISTIC_WINDOW: usize = 100 * 1024;

/// Which step produced a page count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageCountMethod {
    /// Not a PDF; one page by definition.
    Image,
    /// Read from the parsed page tree.
    Parsed,
    /// Heuristic: a `/Count N` token.
    CountToken,
    /// Heuristic: number of `/Type /Page` markers.
    PageMarkers,
    /// Nothing worked; one page.
    Default,
}

impl fmt::Display for PageCountMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageCountMethod::Image => "image",
            PageCountMethod::Parsed => "parsed",
            PageCountMethod::CountToken => "/Count token",
            PageCountMethod::PageMarkers => "/Type /Page markers",
            PageCountMethod::Default => "default",
        };
        f.write_str(s)
    }
}

/// A page count and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    /// Always ≥ 1.
    pub pages: u32,
    pub method: PageCountMethod,
}

impl PageCount {
    const fn new(pages: u32, method: PageCountMethod) -> Self {
        Self { pages, method }
    }
}

/// Page count for a validated file of the given kind.
pub async fn count_pages(kind: FileKind, bytes: Bytes, window: usize) -> PageCount {
    match kind {
        FileKind::Image => PageCount::new(1, PageCountMethod::Image),
        FileKind::Pdf => count_pdf_pages_with_window(bytes, window).await,
    }
}

/// Best-effort page count for a PDF. Never fails; worst case is one page.
pub async fn count_pdf_pages(bytes: Bytes) -> PageCount {
    count_pdf_pages_with_window(bytes, DEFAULT_HEURISTIC_WINDOW).await
}

/// [`count_pdf_pages`] with a custom heuristic window.
pub async fn count_pdf_pages_with_window(bytes: Bytes, window: usize) -> PageCount {
    match parser::parse_page_count(bytes.clone()).await {
        Ok(pages) => PageCount::new(pages, PageCountMethod::Parsed),
        Err(e) => {
            warn!("PDF parse failed ({}); falling back to structural heuristics", e);
            heuristic_page_count(&bytes, window)
        }
    }
}

// ── Heuristics ───────────────────────────────────────────────────────────

static RE_COUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Count\s*(\d+)").unwrap());

// `\b` after `Page` rules out `/Pages`: `e` and `s` are both word characters.
static RE_PAGE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"/Type\s*/Page\b").unwrap());

/// Regex fallback over the first `window` bytes.
pub fn heuristic_page_count(bytes: &[u8], window: usize) -> PageCount {
    let head = &bytes[..bytes.len().min(window)];
    let text = String::from_utf8_lossy(head);

    if let Some(n) = count_token(&text) {
        debug!("Heuristic: /Count {}", n);
        return PageCount::new(n, PageCountMethod::CountToken);
    }

    let markers = count_page_markers(&text);
    if markers > 0 {
        debug!("Heuristic: {} /Type /Page markers", markers);
        return PageCount::new(markers, PageCountMethod::PageMarkers);
    }

    warn!("Could not determine PDF page count; defaulting to 1");
    PageCount::new(1, PageCountMethod::Default)
}

fn count_token(text: &str) -> Option<u32> {
    RE_COUNT
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .find(|&n| n >= 1)
}

fn count_page_markers(text: &str) -> u32 {
    u32::try_from(RE_PAGE_MARKER.find_iter(text).count()).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corrupt_pdf_with_markers(n: usize) -> Vec<u8> {
        let mut s = String::from("%PDF-1.4\n1 0 obj\n<< /Type /Pages /Kids [] >>\nendobj\n");
        for i in 0..n {
            s.push_str(&format!("{} 0 obj\n<< /Type /Page /Parent 1 0 R >>\nendobj\n", i + 2));
        }
        s.into_bytes()
    }

    #[test]
    fn count_token_takes_precedence() {
        let text = b"%PDF-1.4 << /Type /Pages /Count 12 >> << /Type /Page >>";
        assert_eq!(
            heuristic_page_count(text, DEFAULT_HEURISTIC_WINDOW),
            PageCount::new(12, PageCountMethod::CountToken)
        );
    }

    #[test]
    fn zero_count_token_is_skipped() {
        let text = b"<< /Count 0 >> << /Count 7 >>";
        assert_eq!(heuristic_page_count(text, 1024).pages, 7);
    }

    #[test]
    fn page_markers_exclude_pages_container() {
        let bytes = corrupt_pdf_with_markers(6);
        assert_eq!(
            heuristic_page_count(&bytes, DEFAULT_HEURISTIC_WINDOW),
            PageCount::new(6, PageCountMethod::PageMarkers)
        );
    }

    #[test]
    fn markers_without_whitespace_are_counted() {
        let text = b"<</Type/Page>> <</Type/Page>> <</Type/Pages>>";
        assert_eq!(heuristic_page_count(text, 1024).pages, 2);
    }

    #[test]
    fn nothing_found_defaults_to_one() {
        assert_eq!(
            heuristic_page_count(b"%PDF-1.4\n%%garbage", DEFAULT_HEURISTIC_WINDOW),
            PageCount::new(1, PageCountMethod::Default)
        );
    }

    #[test]
    fn markers_past_the_window_are_ignored() {
        let mut bytes = vec![b' '; 2048];
        bytes.extend_from_slice(b"<< /Type /Page >>");
        assert_eq!(heuristic_page_count(&bytes, 1024).method, PageCountMethod::Default);
    }

    #[test]
    fn invalid_utf8_is_tolerated() {
        let mut bytes = vec![0xFF, 0xFE, 0x80];
        bytes.extend_from_slice(b"/Type /Page /Type /Page");
        assert_eq!(heuristic_page_count(&bytes, 1024).pages, 2);
    }

    #[tokio::test]
    async fn corrupt_pdf_falls_through_to_markers() {
        let count = count_pdf_pages(Bytes::from(corrupt_pdf_with_markers(4))).await;
        assert_eq!(count, PageCount::new(4, PageCountMethod::PageMarkers));
    }

    #[tokio::test]
    async fn images_are_one_page() {
        let count = count_pages(FileKind::Image, Bytes::from_static(b"\x89PNG"), 1024).await;
        assert_eq!(count, PageCount::new(1, PageCountMethod::Image));
    }
}
