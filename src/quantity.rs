//! Billable quantity of a selection.

use crate::tracker::SelectedFile;

/// Sum of page counts over every selected file, regardless of upload status.
///
/// An empty selection is 0 pages. A file in `error` still counts: it is
/// still selected and can be retried.
pub fn total_page_count(files: &[SelectedFile]) -> u32 {
    files
        .iter()
        .fold(0u32, |acc, f| acc.saturating_add(f.page_count))
}
