// PDF extraction module

use std::panic::{self, AssertUnwindSafe};

use crate::document_processing::schemas::ExtractedDocument;
use crate::{Error, Result};

/// Every PDF starts with this header
pub const PDF_MAGIC: &[u8] = b"%PDF-";

pub const EXTRACTION_TOOL: &str = "pdf-extract";

const UNREADABLE_PDF: &str = "the file could not be read as a PDF document";

pub struct PdfExtractor;

impl PdfExtractor {
    /// Extract the selectable text of every page, in page order.
    ///
    /// Pages are separated by a `--- page N ---` marker line. Fails with
    /// [`Error::InvalidInputFormat`] when the bytes are not a readable PDF and
    /// with [`Error::NoExtractableText`] when the pages carry no text at all.
    pub fn extract(pdf_bytes: &[u8]) -> Result<ExtractedDocument> {
        if !Self::has_pdf_signature(pdf_bytes) {
            return Err(Error::InvalidInputFormat(
                "content does not start with a PDF header".to_string(),
            ));
        }

        let pages = Self::extract_pages(pdf_bytes)?;
        let page_count = pages.len();

        let cleaned: Vec<String> = pages.iter().map(|p| Self::clean_page(p)).collect();
        if cleaned.iter().all(|p| p.trim().is_empty()) {
            tracing::warn!(pages = page_count, "pdf has no selectable text");
            return Err(Error::NoExtractableText);
        }

        let text = Self::join_pages(&cleaned);
        tracing::debug!(pages = page_count, chars = text.len(), "extracted pdf text");

        Ok(ExtractedDocument::new(text, pdf_bytes.len(), Some(page_count)))
    }

    pub fn has_pdf_signature(bytes: &[u8]) -> bool {
        bytes.starts_with(PDF_MAGIC)
    }

    /// Marker line placed before each page's text
    pub fn page_marker(page_number: usize) -> String {
        format!("--- page {} ---", page_number)
    }

    // pdf_extract can panic on malformed input instead of returning an error
    fn extract_pages(pdf_bytes: &[u8]) -> Result<Vec<String>> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        }));

        match result {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "pdf-extract rejected document");
                Err(Error::InvalidInputFormat(UNREADABLE_PDF.to_string()))
            }
            Err(_) => {
                tracing::debug!("pdf-extract panicked on document");
                Err(Error::InvalidInputFormat(UNREADABLE_PDF.to_string()))
            }
        }
    }

    /// Trim trailing whitespace on each line, collapse blank-line runs to one
    /// and drop leading/trailing blank lines.
    fn clean_page(raw: &str) -> String {
        let mut lines: Vec<&str> = Vec::new();
        let mut previous_blank = true;

        for line in raw.lines().map(str::trim_end) {
            let blank = line.trim().is_empty();
            if blank && previous_blank {
                continue;
            }
            lines.push(if blank { "" } else { line });
            previous_blank = blank;
        }

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }

    fn join_pages(pages: &[String]) -> String {
        let mut text = String::new();
        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                text.push_str("\n\n");
            }
            text.push_str(&Self::page_marker(index + 1));
            text.push('\n');
            text.push_str(page);
        }
        text
    }
}
