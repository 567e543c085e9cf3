//! Top-level markup entry points.
//!
//! [`markup`] runs the whole pipeline for one document and returns the
//! annotated PDF bytes plus per-page outcomes. Page requests fan out over a
//! bounded worker pool; results fan back in and are applied to the document
//! by a single writer in page order, so the output page ordering always
//! matches the input and the document is serialised exactly once.

use crate::config::MarkupConfig;
use crate::error::MarkupError;
use crate::output::{DocumentMetadata, MarkupOutput, MarkupStats, PageOutcome};
use crate::pipeline::{annotate::MarkupWriter, encode, input, render, scrape, vision};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Output filename used by the CLI when none is given.
pub const DEFAULT_OUTPUT_NAME: &str = "marked_output.pdf";

/// Annotate a PDF file or URL according to a natural-language instruction.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `input_str`   — Local file path or HTTP/HTTPS URL to a PDF
/// * `instruction` — What to mark up, e.g. "Highlight all temperatures above 300°C"
/// * `config`      — Markup configuration
///
/// # Errors
/// Returns `Err(MarkupError)` for any fatal condition: unreadable input,
/// corrupt PDF, missing provider credential, a rasterisation failure, or a
/// page whose model call failed after its retry budget. Unparseable reply
/// lines are not errors; they surface as warnings in the page outcomes.
pub async fn markup(
    input_str: impl AsRef<str>,
    instruction: impl AsRef<str>,
    config: &MarkupConfig,
) -> Result<MarkupOutput, MarkupError> {
    let total_start = Instant::now();
    let input_str = input_str.as_ref();
    let instruction = instruction.as_ref().trim();
    if instruction.is_empty() {
        return Err(MarkupError::MissingInstruction);
    }
    info!("Starting markup run: {}", input_str);

    // ── Step 1: Resolve input ────────────────────────────────────────────
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    let pdf_path = resolved.path().to_path_buf();

    // ── Step 2: Get/create provider (credential errors surface here,
    //    before any page work) ────────────────────────────────────────────
    let provider = resolve_provider(config)?;

    // ── Step 3: Extract metadata ─────────────────────────────────────────
    let metadata = render::extract_metadata(&pdf_path, config.password.as_deref()).await?;
    let total_pages = metadata.page_count;
    info!("PDF has {} pages", total_pages);

    // ── Step 4: Compute page indices ─────────────────────────────────────
    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(MarkupError::PageOutOfRange {
            page: 0,
            total: total_pages,
        });
    }
    debug!("Selected {} pages for markup", page_indices.len());

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start(page_indices.len());
    }

    // ── Step 5: Rasterise pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = render::render_pages(&pdf_path, config, &page_indices).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} pages in {}ms",
        rendered.len(),
        render_duration_ms
    );

    // ── Step 6: Request + scrape, bounded fan-out ────────────────────────
    let model_start = Instant::now();
    let mut pages = process_pages(&provider, rendered, instruction, config).await?;
    let model_duration_ms = model_start.elapsed().as_millis() as u64;

    // Fan back into document order before touching the document.
    pages.sort_by_key(|p| p.page_num);

    // ── Step 7: Apply annotations, one writer, page order ────────────────
    let mut writer = MarkupWriter::open(&pdf_path)?;
    let mut annotation_count = 0usize;
    for page in &pages {
        for candidate in &page.candidates {
            if writer.apply(page.page_num - 1, candidate, config.bounds_policy)? {
                annotation_count += 1;
            }
        }
    }

    // ── Step 8: Serialise once ───────────────────────────────────────────
    let pdf = writer.save()?;

    // ── Step 9: Stats ────────────────────────────────────────────────────
    let warning_count = pages.iter().map(|p| p.warnings.len()).sum();
    let stats = MarkupStats {
        total_pages,
        processed_pages: pages.len(),
        annotation_count,
        warning_count,
        total_input_tokens: pages.iter().map(|p| p.input_tokens as u64).sum(),
        total_output_tokens: pages.iter().map(|p| p.output_tokens as u64).sum(),
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        render_duration_ms,
        model_duration_ms,
    };

    info!(
        "Markup complete: {} annotations over {} pages, {} warnings, {}ms total",
        annotation_count, stats.processed_pages, warning_count, stats.total_duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(page_indices.len(), annotation_count);
    }

    Ok(MarkupOutput {
        pdf,
        pages,
        metadata,
        stats,
    })
}

/// Annotate a PDF and write the result directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn markup_to_file(
    input_str: impl AsRef<str>,
    instruction: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &MarkupConfig,
) -> Result<MarkupStats, MarkupError> {
    let output = markup(input_str, instruction, config).await?;
    let path = output_path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| MarkupError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, &output.pdf)
        .await
        .map_err(|e| MarkupError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| MarkupError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    Ok(output.stats)
}

/// Annotate PDF bytes in memory.
///
/// This avoids the need for the caller to create a temporary file.
/// Internally the library writes `bytes` to a managed [`tempfile`] and cleans
/// it up automatically on return or panic; cleanup failure is swallowed by
/// the tempfile Drop.
pub async fn markup_from_bytes(
    bytes: &[u8],
    instruction: impl AsRef<str>,
    config: &MarkupConfig,
) -> Result<MarkupOutput, MarkupError> {
    let mut tmp = tempfile::NamedTempFile::new()
        .map_err(|e| MarkupError::Internal(format!("tempfile: {e}")))?;
    tmp.write_all(bytes)
        .map_err(|e| MarkupError::Internal(format!("tempfile write: {e}")))?;
    let path = tmp.path().to_string_lossy().to_string();
    // `tmp` is dropped (and the file deleted) when `markup` returns
    markup(&path, instruction, config).await
}

/// Synchronous wrapper around [`markup`].
///
/// Creates a temporary tokio runtime internally.
pub fn markup_sync(
    input_str: impl AsRef<str>,
    instruction: impl AsRef<str>,
    config: &MarkupConfig,
) -> Result<MarkupOutput, MarkupError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| MarkupError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(markup(input_str, instruction, config))
}

/// Extract PDF metadata without marking anything up.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>) -> Result<DocumentMetadata, MarkupError> {
    let resolved = input::resolve_input(input_str.as_ref(), 120).await?;
    let pdf_path = resolved.path().to_path_buf();
    render::extract_metadata(&pdf_path, None).await
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run encode → request → scrape for every rendered page, `concurrency` at a
/// time. Any page whose model call fails terminally turns into the run's
/// error; parse warnings never do.
async fn process_pages(
    provider: &Arc<dyn LLMProvider>,
    rendered: Vec<(usize, image::DynamicImage)>,
    instruction: &str,
    config: &MarkupConfig,
) -> Result<Vec<PageOutcome>, MarkupError> {
    let total_pages = rendered.len();

    let results: Vec<Result<PageOutcome, MarkupError>> =
        stream::iter(rendered.into_iter().map(|(idx, img)| {
            let provider = Arc::clone(provider);
            let config = config.clone();
            let instruction = instruction.to_string();
            let page_num = idx + 1;
            async move {
                let image_data =
                    encode::encode_page(&img).map_err(|e| MarkupError::RasterisationFailed {
                        page: page_num,
                        detail: format!("Image encoding failed: {}", e),
                    })?;
                drop(img);

                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_start(page_num, total_pages);
                }

                let reply =
                    vision::request_page(&provider, page_num, image_data, &instruction, &config)
                        .await?;

                if let Some(ref cb) = config.progress_callback {
                    cb.on_page_response(page_num, &reply.response);
                }

                let scraped = scrape::scrape_response(page_num, &reply.response);
                if let Some(ref cb) = config.progress_callback {
                    for warning in &scraped.warnings {
                        cb.on_parse_warning(page_num, &warning.line);
                    }
                    cb.on_page_complete(page_num, total_pages, scraped.candidates.len());
                }

                Ok(PageOutcome {
                    page_num,
                    response: reply.response,
                    candidates: scraped.candidates,
                    warnings: scraped.warnings,
                    input_tokens: reply.input_tokens,
                    output_tokens: reply.output_tokens,
                    duration_ms: reply.duration_ms,
                    retries: reply.retries,
                })
            }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    results.into_iter().collect()
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, MarkupError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        MarkupError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// The four-level fallback chain lets library users and CLI users each set
/// exactly as much or as little as they need:
///
/// 1. **Pre-built provider** (`config.provider`) — the caller constructed and
///    configured the provider entirely; we use it as-is. Useful in tests or
///    when the caller needs custom middleware (caching, rate-limiting).
///
/// 2. **Named provider + model** (`config.provider_name`) — the caller named
///    a provider (e.g. `"openai"`) and optional model. The factory reads the
///    corresponding API key (`OPENAI_API_KEY`, etc.) from the environment.
///
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`) —
///    both env vars set means the caller chose a provider and model at the
///    execution environment level (Makefile, shell script, CI).
///
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — the factory
///    scans all known API key variables and picks the first available
///    provider.
///
/// A run with no resolvable credential fails here, before any page work.
fn resolve_provider(config: &MarkupConfig) -> Result<Arc<dyn LLMProvider>, MarkupError> {
    // 1) User-provided provider takes priority
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    // 2) Provider name + model
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
        return create_vision_provider(name, model);
    }

    // 3) Environment pair
    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    // Prefer OpenAI explicitly when an OpenAI API key is present, so users
    // with multiple provider keys get a deterministic default.
    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or("gpt-4.1-nano");
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| MarkupError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_instruction_is_rejected_before_any_io() {
        let config = MarkupConfig::default();
        let result = markup("/nonexistent.pdf", "   ", &config).await;
        assert!(matches!(result, Err(MarkupError::MissingInstruction)));
    }

    #[tokio::test]
    async fn missing_file_is_an_input_error() {
        let config = MarkupConfig::default();
        let result = markup("/definitely/not/a/real/file.pdf", "Highlight errors", &config).await;
        assert!(matches!(result, Err(MarkupError::FileNotFound { .. })));
    }
}
