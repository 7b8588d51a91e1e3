//! Progress-callback trait for extraction and generation events.
//!
//! Pass an [`Arc<dyn AnalysisProgressCallback>`] to
//! [`crate::Analyzer::analyze_bytes`] to observe a request as it runs. The
//! CLI forwards events to a terminal progress bar, and the web server to
//! `tracing`. The core never talks to a UI directly.
//!
//! # Example
//!
//! ```rust
//! use pliego_analyzer::AnalysisProgressCallback;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct PageCounter(AtomicUsize);
//!
//! impl AnalysisProgressCallback for PageCounter {
//!     fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Extrayendo texto: {}/{} páginas ({} chars)", page_num, total_pages, chars);
//!     }
//! }
//! ```

use std::sync::Arc;

/// Observer for a single analysis request.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Extraction events are emitted from a blocking
/// worker thread, hence `Send + Sync`.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once the document is open and its page count is known.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called exactly once per page, in page order.
    ///
    /// # Arguments
    /// * `page_num`    — 1-indexed page number
    /// * `total_pages` — pages in the document
    /// * `chars`       — characters extracted from this page
    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
        let _ = (page_num, total_pages, chars);
    }

    /// Called after the last page, with the length of the joined text.
    fn on_extraction_complete(&self, total_pages: usize, total_chars: usize) {
        let _ = (total_pages, total_chars);
    }

    /// Called before the first generation attempt.
    fn on_generation_start(&self, max_attempts: u32) {
        let _ = max_attempts;
    }

    /// Called when a generation attempt fails (error or unusable reply).
    ///
    /// This is a warning channel only; the retry loop carries on.
    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, reason: &str) {
        let _ = (attempt, max_attempts, reason);
    }

    /// Called once generation finishes, successfully or with the fallback.
    fn on_generation_complete(&self, attempts: u32, succeeded: bool) {
        let _ = (attempts, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Forwards every event to `tracing`. Used by the web server.
pub struct TracingProgressCallback {
    label: String,
}

impl TracingProgressCallback {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl AnalysisProgressCallback for TracingProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        tracing::info!("{}: extracting text from {} pages", self.label, total_pages);
    }

    fn on_page_extracted(&self, page_num: usize, total_pages: usize, chars: usize) {
        tracing::debug!(
            "{}: page {}/{} extracted ({} chars)",
            self.label,
            page_num,
            total_pages,
            chars
        );
    }

    fn on_extraction_complete(&self, total_pages: usize, total_chars: usize) {
        tracing::info!(
            "{}: extracted ~{} characters from {} pages",
            self.label,
            total_chars,
            total_pages
        );
    }

    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, reason: &str) {
        tracing::warn!(
            "{}: generation attempt {}/{} failed: {}",
            self.label,
            attempt,
            max_attempts,
            reason
        );
    }

    fn on_generation_complete(&self, attempts: u32, succeeded: bool) {
        if succeeded {
            tracing::info!("{}: answer received after {} attempt(s)", self.label, attempts);
        } else {
            tracing::warn!(
                "{}: no usable answer after {} attempt(s), returning fallback",
                self.label,
                attempts
            );
        }
    }
}

/// Convenience alias for the shared callback type.
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        failures: AtomicUsize,
        started_total: AtomicUsize,
    }

    impl AnalysisProgressCallback for TrackingCallback {
        fn on_extraction_start(&self, total_pages: usize) {
            self.started_total.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_extracted(&self, _page_num: usize, _total_pages: usize, _chars: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_attempt_failed(&self, _attempt: u32, _max: u32, _reason: &str) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_extraction_start(5);
        cb.on_page_extracted(1, 5, 42);
        cb.on_extraction_complete(5, 210);
        cb.on_generation_start(3);
        cb.on_attempt_failed(1, 3, "timeout");
        cb.on_generation_complete(2, true);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_extraction_start(3);
        for p in 1..=3 {
            tracker.on_page_extracted(p, 3, 100);
        }
        tracker.on_attempt_failed(1, 3, "HTTP 503");

        assert_eq!(tracker.started_total.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.pages.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(TracingProgressCallback::new("pliego.pdf"));
        cb.on_extraction_start(10);
        cb.on_page_extracted(1, 10, 512);
        cb.on_generation_complete(3, false);
    }
}
