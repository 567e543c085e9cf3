//! # pdfmarkup
//!
//! Annotate PDF documents from natural-language instructions using Vision
//! Language Models (VLMs).
//!
//! ## What it does
//!
//! Give it a PDF and an instruction like *"Highlight all temperatures above
//! 300°C"*. Each page is rasterised to a PNG and shown to a VLM together with
//! the instruction; the model replies in free text with bounding boxes and
//! comments, which are scraped and burned onto the original document as
//! standard Highlight + FreeText annotations. The result is the same PDF
//! with the markups added.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF + instruction
//!  │
//!  ├─ 1. Input    resolve local file or download from URL
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Encode   PNG → base64 ImageData
//!  ├─ 4. Vision   per-page VLM calls with timeout + retry, bounded fan-out
//!  ├─ 5. Scrape   strict line scan of the reply for bbox/comment pairs
//!  ├─ 6. Annotate highlight + comment annotations, single writer, page order
//!  └─ 7. Output   annotated PDF bytes + per-page outcomes and stats
//! ```
//!
//! The model's reply is treated as untrusted prose: a line yields an
//! annotation only when its coordinates tokenize as exactly four numeric
//! literals, and every line that fails to parse is skipped with a warning —
//! a bad line never aborts a page, and a bad page reply never corrupts the
//! document.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdfmarkup::{markup, MarkupConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = MarkupConfig::default();
//!     let output = markup("report.pdf", "Highlight all negative balances", &config).await?;
//!     std::fs::write("marked_output.pdf", &output.pdf)?;
//!     eprintln!(
//!         "{} annotations, {} parse warnings",
//!         output.stats.annotation_count, output.stats.warning_count
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfmark` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! pdfmarkup = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod markup;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BoundsPolicy, MarkupConfig, MarkupConfigBuilder, PageSelection};
pub use error::MarkupError;
pub use markup::{
    inspect, markup, markup_from_bytes, markup_sync, markup_to_file, DEFAULT_OUTPUT_NAME,
};
pub use output::{DocumentMetadata, MarkupOutput, MarkupStats, PageOutcome};
pub use pipeline::scrape::{AnnotationCandidate, ParseFailure, ParseWarning, Rect, ScrapeOutcome};
pub use progress::{MarkupProgressCallback, NoopProgressCallback, ProgressCallback};
