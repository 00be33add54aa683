//! Progress-callback trait for per-file and per-page run events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the pipeline walks the input directory. The CLI uses it to draw
//! a page bar and echo streamed LLM tokens; library callers can forward the
//! events anywhere.
//!
//! # Example
//!
//! ```rust
//! use ipo_vc_extract::{ExtractionConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PageCounter {
//!     pages: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for PageCounter {
//!     fn on_page_extracted(&self, _file: &str, _page: usize, _total: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let counter = Arc::new(PageCounter { pages: AtomicUsize::new(0) });
//! let config = ExtractionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::OutputRow;
use std::sync::Arc;

/// Called by the pipeline as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after the input directory has been listed.
    fn on_run_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file is opened.
    ///
    /// # Arguments
    /// * `file`  — file name
    /// * `index` — 1-indexed position in the run
    /// * `total` — files in the run
    fn on_file_start(&self, file: &str, index: usize, total: usize) {
        let _ = (file, index, total);
    }

    /// Called after each page's text has been extracted.
    ///
    /// # Arguments
    /// * `page`        — 1-indexed page number
    /// * `total_pages` — pages in the document
    fn on_page_extracted(&self, file: &str, page: usize, total_pages: usize) {
        let _ = (file, page, total_pages);
    }

    /// Called when the LLM request for a file is about to be sent.
    fn on_refine_start(&self, file: &str, model: &str) {
        let _ = (file, model);
    }

    /// Called for every streamed LLM text delta.
    fn on_refine_chunk(&self, file: &str, chunk: &str) {
        let _ = (file, chunk);
    }

    /// Called when the LLM pass failed and the rule guess is used instead.
    fn on_refine_failed(&self, file: &str, error: &str) {
        let _ = (file, error);
    }

    /// Called after a file's row has been appended to the results file.
    fn on_file_complete(&self, file: &str, row: &OutputRow) {
        let _ = (file, row);
    }

    /// Called when a file is skipped (no row written).
    fn on_file_skipped(&self, file: &str, error: &str) {
        let _ = (file, error);
    }

    /// Called once after every file has been attempted.
    ///
    /// # Arguments
    /// * `rows_written`  — rows appended to the results file
    /// * `files_skipped` — files that produced no row
    fn on_run_complete(&self, rows_written: usize, files_skipped: usize) {
        let _ = (rows_written, files_skipped);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        completes: AtomicUsize,
        skips: AtomicUsize,
        chunks: AtomicUsize,
    }

    impl ExtractionProgressCallback for TrackingCallback {
        fn on_page_extracted(&self, _file: &str, _page: usize, _total_pages: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_refine_chunk(&self, _file: &str, _chunk: &str) {
            self.chunks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_complete(&self, _file: &str, _row: &OutputRow) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_file_skipped(&self, _file: &str, _error: &str) {
            self.skips.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(2);
        cb.on_file_start("a.pdf", 1, 2);
        cb.on_page_extracted("a.pdf", 1, 3);
        cb.on_refine_chunk("a.pdf", "{");
        cb.on_file_skipped("b.pdf", "encrypted");
        cb.on_run_complete(1, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_extracted("a.pdf", 1, 2);
        tracker.on_page_extracted("a.pdf", 2, 2);
        tracker.on_refine_chunk("a.pdf", "{\"股票代码\"");
        tracker.on_file_skipped("b.pdf", "no text");

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.chunks.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.skips.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_file_start("x.pdf", 1, 10);
    }
}
