// PDF text extraction
// A thin collaborator around lopdf: the pipeline only ever sees per-page
// text, never the document internals.


use std::path::Path;
use tracing::{debug, warn};

use crate::{RagError, Result};

/// Extracted text of a single PDF page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    /// 1-based page number.
    pub page_number: u32,
    pub text: String,
}

/// Extract per-page text from a PDF file.
///
/// A non-PDF path is a `Validation` error (rejected before anything is
/// read); an unreadable document is an `Ingestion` error. Pages that fail to
/// extract are logged and skipped; blank pages are dropped since they would
/// chunk to nothing.
#[inline]
pub fn extract_pages(path: &Path) -> Result<Vec<PageText>> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(RagError::Validation(format!(
            "Only PDF files are allowed: {}",
            path.display()
        )));
    }

    let doc = lopdf::Document::load(path).map_err(|e| {
        RagError::Ingestion(format!("Failed to load PDF {}: {}", path.display(), e))
    })?;

    let mut pages = Vec::new();
    for &page_number in doc.get_pages().keys() {
        match doc.extract_text(&[page_number]) {
            Ok(raw) => {
                let text = normalize_whitespace(&raw);
                if text.is_empty() {
                    debug!("Page {} of {} is blank, skipping", page_number, path.display());
                } else {
                    pages.push(PageText { page_number, text });
                }
            }
            Err(e) => {
                warn!(
                    "Failed to extract text from page {} of {}: {}",
                    page_number,
                    path.display(),
                    e
                );
            }
        }
    }

    debug!(
        "Extracted {} non-empty pages from {}",
        pages.len(),
        path.display()
    );

    Ok(pages)
}

/// Collapse runs of whitespace into single spaces.
fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
