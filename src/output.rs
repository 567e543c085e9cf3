//! Result types returned by the markup pipeline.
//!
//! [`MarkupOutput`] is the full result of a run: the annotated PDF bytes,
//! one [`PageOutcome`] per processed page (raw model reply, parsed
//! candidates, parse warnings), document metadata, and aggregate stats.
//! The raw reply text is retained on each page outcome so callers can show
//! it to the user — it is not otherwise consulted after scraping.

use crate::pipeline::scrape::{AnnotationCandidate, ParseWarning};
use serde::{Deserialize, Serialize};

/// The complete result of a markup run.
#[derive(Debug, Serialize)]
pub struct MarkupOutput {
    /// The annotated PDF, serialised once at the end of the run.
    ///
    /// Skipped by serde: the `--json` report is about outcomes, not payload.
    #[serde(skip)]
    pub pdf: Vec<u8>,

    /// Per-page outcomes, sorted by page number.
    pub pages: Vec<PageOutcome>,

    /// Document metadata extracted before any page work.
    pub metadata: DocumentMetadata,

    /// Aggregate counters for the run.
    pub stats: MarkupStats,
}

/// Outcome of one page's request/scrape cycle.
///
/// Always describes a page whose model call succeeded — a page whose call
/// fails after retries aborts the whole run instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageOutcome {
    /// 1-indexed page number.
    pub page_num: usize,

    /// The model's raw free-text reply, kept for display.
    pub response: String,

    /// Candidates successfully scraped from the reply, in line order.
    pub candidates: Vec<AnnotationCandidate>,

    /// Lines that looked like candidates but failed to parse.
    pub warnings: Vec<ParseWarning>,

    /// Prompt tokens consumed by this page's call.
    pub input_tokens: usize,

    /// Completion tokens generated by this page's call.
    pub output_tokens: usize,

    /// Wall-clock duration of the model call including retries.
    pub duration_ms: u64,

    /// How many retries the call needed (0 = first attempt succeeded).
    pub retries: u8,
}

/// Aggregate statistics for a markup run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkupStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages actually sent to the model.
    pub processed_pages: usize,
    /// Annotations drawn across the whole document.
    pub annotation_count: usize,
    /// Unparseable candidate lines across the whole document.
    pub warning_count: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
    pub render_duration_ms: u64,
    pub model_duration_ms: u64,
}

/// PDF document metadata (pdfium tag dictionary).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
    pub is_encrypted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_report_skips_pdf_bytes() {
        let output = MarkupOutput {
            pdf: vec![0x25, 0x50, 0x44, 0x46],
            pages: vec![],
            metadata: DocumentMetadata {
                title: None,
                author: None,
                subject: None,
                creator: None,
                producer: None,
                creation_date: None,
                modification_date: None,
                page_count: 1,
                pdf_version: "1.7".into(),
                is_encrypted: false,
            },
            stats: MarkupStats::default(),
        };
        let json = serde_json::to_string(&output).unwrap();
        assert!(!json.contains("\"pdf\""));
        assert!(json.contains("\"page_count\":1"));
    }
}
