//! Progress-callback trait for per-page markup events.
//!
//! Inject an [`Arc<dyn MarkupProgressCallback>`] via
//! [`crate::config::MarkupConfigBuilder::progress_callback`] to receive
//! real-time events as the pipeline processes each page. This trait is the
//! whole display surface of the library: the CLI uses it to drive a progress
//! bar, echo each page's raw model reply, and print per-line parse warnings.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a channel, a WebSocket, or a terminal progress bar
//! without the library knowing anything about how the host application
//! communicates. The trait is `Send + Sync` so it works correctly when pages
//! are processed concurrently.

use std::sync::Arc;

/// Called by the markup pipeline as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// `on_page_start`, `on_page_response`, `on_parse_warning`, and
/// `on_page_complete` may be called concurrently from different tasks.
/// Implementations must protect shared mutable state with appropriate
/// synchronisation primitives (e.g. `Mutex`, `AtomicUsize`).
pub trait MarkupProgressCallback: Send + Sync {
    /// Called once before any page is rendered.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the VLM request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called with the model's raw free-text reply for a page.
    ///
    /// Fired before scraping, so the caller sees exactly what the model said
    /// even when nothing on the page parses.
    fn on_page_response(&self, page_num: usize, response: &str) {
        let _ = (page_num, response);
    }

    /// Called once per candidate line that failed to parse.
    ///
    /// # Arguments
    /// * `page_num` — 1-indexed page number
    /// * `line`     — the offending reply line, verbatim
    fn on_parse_warning(&self, page_num: usize, line: &str) {
        let _ = (page_num, line);
    }

    /// Called when a page's reply has been scraped.
    ///
    /// # Arguments
    /// * `candidates` — how many annotation candidates the page yielded
    fn on_page_complete(&self, page_num: usize, total_pages: usize, candidates: usize) {
        let _ = (page_num, total_pages, candidates);
    }

    /// Called once after the annotated document has been assembled.
    ///
    /// # Arguments
    /// * `annotations` — total annotations drawn across the document
    fn on_run_complete(&self, total_pages: usize, annotations: usize) {
        let _ = (total_pages, annotations);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl MarkupProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::MarkupConfig`].
pub type ProgressCallback = Arc<dyn MarkupProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct TrackingCallback {
        starts: AtomicUsize,
        responses: Mutex<Vec<String>>,
        warnings: AtomicUsize,
        completes: AtomicUsize,
        final_annotations: AtomicUsize,
    }

    impl MarkupProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_response(&self, _page_num: usize, response: &str) {
            self.responses.lock().unwrap().push(response.to_string());
        }

        fn on_parse_warning(&self, _page_num: usize, _line: &str) {
            self.warnings.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, _candidates: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_run_complete(&self, _total_pages: usize, annotations: usize) {
            self.final_annotations.store(annotations, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(3);
        cb.on_page_start(1, 3);
        cb.on_page_response(1, "bbox: (1,2,3,4) comment: x");
        cb.on_parse_warning(2, "bbox: nonsense");
        cb.on_page_complete(1, 3, 1);
        cb.on_run_complete(3, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback {
            starts: AtomicUsize::new(0),
            responses: Mutex::new(Vec::new()),
            warnings: AtomicUsize::new(0),
            completes: AtomicUsize::new(0),
            final_annotations: AtomicUsize::new(0),
        };

        tracker.on_run_start(2);
        tracker.on_page_start(1, 2);
        tracker.on_page_response(1, "bbox: (1,2,3,4) comment: ok");
        tracker.on_page_complete(1, 2, 1);
        tracker.on_page_start(2, 2);
        tracker.on_page_response(2, "no issues found");
        tracker.on_parse_warning(2, "bbox: (1,2) comment: short");
        tracker.on_page_complete(2, 2, 0);
        tracker.on_run_complete(2, 1);

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.responses.lock().unwrap().len(), 2);
        assert_eq!(tracker.warnings.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.final_annotations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn MarkupProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_page_complete(1, 10, 0);
    }
}
