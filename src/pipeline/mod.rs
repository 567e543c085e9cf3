//! Pipeline stages for instruction-driven PDF markup.
//!
//! Each submodule implements exactly one transformation step.
//! Keeping stages separate makes each independently testable and lets us
//! swap implementations (e.g. switch rendering backend) without touching
//! other stages.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ vision ──▶ scrape ──▶ annotate
//! (URL/path) (pdfium)  (base64)   (VLM)     (parser)    (lopdf)
//! ```
//!
//! 1. [`input`]    — canonicalise the user-supplied path or URL to a local file
//! 2. [`render`]   — rasterise selected pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]   — PNG-encode and base64-wrap each `DynamicImage` for the
//!    multimodal API request body
//! 4. [`vision`]   — drive the per-page VLM call with timeout and
//!    retry/backoff; the only stage with network I/O
//! 5. [`scrape`]   — pull (rectangle, comment) candidates out of the model's
//!    free-text reply, one warning per unparseable line
//! 6. [`annotate`] — burn highlight + comment annotations into the document
//!    and serialise it once

pub mod annotate;
pub mod encode;
pub mod input;
pub mod render;
pub mod scrape;
pub mod vision;
