//! VLM interaction: build the per-page markup request and call the provider.
//!
//! This module converts a rasterised page image plus the user's instruction
//! into a VLM API call and returns the raw reply. It is intentionally thin —
//! all prompt text lives in [`crate::prompts`] so it can be changed without
//! touching retry or error-handling logic here.
//!
//! ## Timeout and Retry Strategy
//!
//! Every attempt is wrapped in `tokio::time::timeout`; a hung call must never
//! block the run. HTTP 429 / 503 errors from LLM APIs are transient and
//! frequent under concurrent load, so failed attempts back off exponentially
//! (`retry_backoff_ms * 2^attempt`) before retrying. A page that is still
//! failing after the retry budget aborts the run with
//! [`MarkupError::ModelCallFailed`] — annotations are never silently dropped.

use crate::config::MarkupConfig;
use crate::error::MarkupError;
use crate::prompts::{user_message, DEFAULT_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// The raw reply for one page, with call accounting.
#[derive(Debug, Clone)]
pub struct PageReply {
    /// 1-indexed page number.
    pub page_num: usize,
    /// The model's free-text completion, unmodified.
    pub response: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    /// Retries the call needed (0 = first attempt succeeded).
    pub retries: u8,
}

/// Request markup suggestions for a single rasterised page.
///
/// ## Message Layout
///
/// The request contains (in order):
/// 1. **System message** — the document-analyst directive (or user override)
/// 2. **User message** — the instruction text with the page PNG attached as a
///    base64 image
///
/// One request per page; pages are never batched into a single call.
pub async fn request_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image_data: ImageData,
    instruction: &str,
    config: &MarkupConfig,
) -> Result<PageReply, MarkupError> {
    let start = Instant::now();
    let system_prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let messages = vec![
        ChatMessage::system(system_prompt),
        ChatMessage::user_with_images(user_message(instruction), vec![image_data]),
    ];

    let options = build_options(config);
    let call_timeout = Duration::from_secs(config.api_timeout_secs);

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: retry {}/{} after {}ms",
                page_num, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(call_timeout, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                let duration = start.elapsed();
                debug!(
                    "Page {}: {} input tokens, {} output tokens, {:?}",
                    page_num,
                    response.prompt_tokens,
                    response.completion_tokens,
                    duration
                );

                return Ok(PageReply {
                    page_num,
                    response: response.content,
                    input_tokens: response.prompt_tokens,
                    output_tokens: response.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    retries: attempt as u8,
                });
            }
            Ok(Err(e)) => {
                let err_msg = format!("{}", e);
                warn!(
                    "Page {}: attempt {} failed — {}",
                    page_num,
                    attempt + 1,
                    err_msg
                );
                last_err = Some(err_msg);
            }
            Err(_) => {
                warn!(
                    "Page {}: attempt {} timed out after {}s",
                    page_num,
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = Some(format!("timed out after {}s", config.api_timeout_secs));
            }
        }
    }

    // Retry budget exhausted; the run cannot proceed with this page missing.
    let detail = last_err.unwrap_or_else(|| "Unknown error".to_string());
    if detail.starts_with("timed out") {
        return Err(MarkupError::ApiTimeout {
            page: page_num,
            secs: config.api_timeout_secs,
        });
    }
    Err(MarkupError::ModelCallFailed {
        page: page_num,
        retries: config.max_retries,
        detail,
    })
}

/// Build `CompletionOptions` from the markup config.
fn build_options(config: &MarkupConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = MarkupConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(1000));
    }
}
