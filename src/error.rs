//! Error types for the pdfmarkup library.
//!
//! Everything fatal lives in [`MarkupError`]: the run cannot proceed (bad
//! input file, wrong password, provider not configured, a page's model call
//! exhausted its retries). Returned as `Err(MarkupError)` from the top-level
//! `markup*` functions.
//!
//! Malformed annotation lines in a model reply are deliberately NOT errors.
//! They are line-local, recoverable events surfaced as
//! [`crate::pipeline::scrape::ParseWarning`] values and through
//! [`crate::progress::MarkupProgressCallback::on_parse_warning`]; scraping
//! always continues with the next line.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdfmarkup library.
#[derive(Debug, Error)]
pub enum MarkupError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The markup instruction was empty.
    #[error("No instruction given.\nPass the text that tells the model what to mark up, e.g. \"Highlight all totals above $1000\".")]
    MissingInstruction,

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A page's model call failed after all retries; the run is aborted.
    #[error("Model call failed for page {page} after {retries} retries: {detail}")]
    ModelCallFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// A page's model call timed out on every attempt.
    #[error("Model call timed out after {secs}s on page {page}")]
    ApiTimeout { page: usize, secs: u64 },

    /// VLM API returned an authentication error (401/403) — retry unlikely to help.
    #[error("Authentication error from provider '{provider}': {detail}")]
    AuthError { provider: String, detail: String },

    /// VLM API returned HTTP 429 — caller should back off.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimitExceeded {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    // ── Annotation / output errors ────────────────────────────────────────
    /// The annotation writer could not mutate or serialise the document.
    #[error("Failed to write annotations: {detail}")]
    AnnotationFailed { detail: String },

    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_call_failed_display() {
        let e = MarkupError::ModelCallFailed {
            page: 3,
            retries: 1,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("page 3"), "got: {msg}");
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn api_timeout_display() {
        let e = MarkupError::ApiTimeout { page: 2, secs: 60 };
        assert!(e.to_string().contains("60s"));
        assert!(e.to_string().contains("page 2"));
    }

    #[test]
    fn rate_limit_display() {
        let e = MarkupError::RateLimitExceeded {
            provider: "openai".into(),
            retry_after_secs: Some(30),
        };
        assert!(e.to_string().contains("openai"));
    }

    #[test]
    fn page_out_of_range_display() {
        let e = MarkupError::PageOutOfRange { page: 9, total: 4 };
        let msg = e.to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('4'));
    }
}
