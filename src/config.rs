//! Configuration types for a markup run.
//!
//! All behaviour is controlled through [`MarkupConfig`], built via its
//! [`MarkupConfigBuilder`]. Keeping every knob in one struct makes it trivial
//! to share configs across threads, serialise them for logging, and diff two
//! runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder pattern lets callers set only what they care about and rely on
//! well-documented defaults for the rest.

use crate::error::MarkupError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a PDF markup run.
///
/// Built via [`MarkupConfig::builder()`] or using
/// [`MarkupConfig::default()`].
///
/// # Example
/// ```rust
/// use pdfmarkup::MarkupConfig;
///
/// let config = MarkupConfig::builder()
///     .dpi(150)
///     .concurrency(4)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct MarkupConfig {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 150.
    ///
    /// 150 DPI is the sweet spot: text is sharp enough for a VLM to read
    /// reliably, while image file sizes stay well below typical API upload
    /// limits (~20 MB). The model's rectangle coordinates come back in page
    /// points regardless of DPI.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// A safety cap independent of DPI. A 150-DPI render of an A0 poster
    /// could produce a 13 000 × 18 000 px image and exhaust memory; this caps
    /// either dimension, scaling the other proportionally.
    pub max_rendered_pixels: u32,

    /// Number of concurrent VLM API calls. Default: 4.
    ///
    /// Page requests are independent of each other; issuing a handful at once
    /// cuts wall-clock time on multi-page documents. The final annotation
    /// pass is always applied by a single writer in page order, so raising
    /// this never reorders output. Lower it if you hit rate-limit errors.
    pub concurrency: usize,

    /// LLM model identifier, e.g. "gpt-4o", "claude-sonnet-4-20250514".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the LLM completion. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what it sees on the page
    /// and to the bbox/comment reply shape the directive asks for.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 1000.
    ///
    /// A page's reply is a handful of bbox/comment lines, not a transcript;
    /// 1 000 tokens covers dozens of annotations while keeping per-page cost
    /// predictable.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient VLM API failure. Default: 1.
    ///
    /// Most 5xx and timeout errors are transient. One retry catches the
    /// common blip; a page that still fails afterwards aborts the run rather
    /// than silently dropping its annotations.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    pub retry_backoff_ms: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system directive. If None, uses the built-in default.
    pub system_prompt: Option<String>,

    /// Page selection. Default: All pages.
    pub pages: PageSelection,

    /// What to do with rectangles that fall outside the page. Default: pass through.
    pub bounds_policy: BoundsPolicy,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-VLM-call timeout in seconds. Default: 60.
    ///
    /// A hung model call must never block the run indefinitely; each attempt
    /// is wrapped in this timeout and the timeout counts as a retryable
    /// failure.
    pub api_timeout_secs: u64,

    /// Optional progress callback receiving per-page events, raw model
    /// responses, and parse warnings.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for MarkupConfig {
    fn default() -> Self {
        Self {
            dpi: 150,
            max_rendered_pixels: 2000,
            concurrency: 4,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1000,
            max_retries: 1,
            retry_backoff_ms: 500,
            password: None,
            system_prompt: None,
            pages: PageSelection::default(),
            bounds_policy: BoundsPolicy::default(),
            download_timeout_secs: 120,
            api_timeout_secs: 60,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for MarkupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkupConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("concurrency", &self.concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("pages", &self.pages)
            .field("bounds_policy", &self.bounds_policy)
            .finish()
    }
}

impl MarkupConfig {
    /// Create a new builder for `MarkupConfig`.
    pub fn builder() -> MarkupConfigBuilder {
        MarkupConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`MarkupConfig`].
#[derive(Debug)]
pub struct MarkupConfigBuilder {
    config: MarkupConfig,
}

impl MarkupConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn bounds_policy(mut self, policy: BoundsPolicy) -> Self {
        self.config.bounds_policy = policy;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<MarkupConfig, MarkupError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(MarkupError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(MarkupError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(MarkupError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of the PDF to mark up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSelection {
    /// Mark up all pages (default).
    #[default]
    All,
    /// Mark up a single page (1-indexed).
    Single(usize),
    /// Mark up a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Mark up specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// What the annotation writer does with rectangles outside the page box.
///
/// The model occasionally hallucinates coordinates past the page edge. The
/// source behaviour is to draw them anyway (viewers simply clip the ink), so
/// pass-through is the default; clamping is opt-in for callers that want
/// every annotation visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BoundsPolicy {
    /// Draw the rectangle exactly where the model said, even off-page. (default)
    #[default]
    PassThrough,
    /// Clamp the rectangle to the page MediaBox before drawing.
    Clamp,
}
