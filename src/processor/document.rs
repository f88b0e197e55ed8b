//! Fixed documents: form-feed paginated text files (the `pdftotext` layout).

use crate::index::SourceRef;
use crate::processor::SourceDocument;
use crate::processor::error::ProcessError;
use std::path::Path;
use tracing::debug;

const PAGE_BREAK: char = '\u{0c}';

/// One source document per page, numbered from 1.
///
/// `start_skip` leading and `end_skip` trailing pages are dropped, then pages
/// without text. A trailing page break does not count as a page.
pub fn split_pages(text: &str, start_skip: usize, end_skip: usize) -> Vec<SourceDocument> {
    let mut pages: Vec<&str> = text.split(PAGE_BREAK).collect();
    if pages.last().is_some_and(|last| last.trim().is_empty()) {
        pages.pop();
    }

    let total = pages.len();
    let keep_until = total.saturating_sub(end_skip);
    debug!(total, start_skip, end_skip, "Splitting document pages");

    pages
        .into_iter()
        .enumerate()
        .filter(|(index, _)| *index >= start_skip && *index < keep_until)
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(index, page)| SourceDocument {
            source: SourceRef::Page(index as u32 + 1),
            text: page.trim().to_string(),
        })
        .collect()
}

/// Read a paginated document from disk and split it into pages
pub async fn read_document(
    path: &Path,
    start_skip: usize,
    end_skip: usize,
) -> Result<Vec<SourceDocument>, ProcessError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        ProcessError::Document(format!("Failed to read {}: {}", path.display(), e))
    })?;
    Ok(split_pages(&text, start_skip, end_skip))
}
