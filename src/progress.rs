//! Progress trait for per-page conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgress>`] via
//! [`crate::config::ConversionConfigBuilder::progress`] to receive real-time
//! events as the pipeline works through a document.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a database
//! record, or a terminal progress bar without the library knowing anything
//! about how the host application communicates. The trait is `Send + Sync`
//! (and the error event owns its `String`) so implementations work unchanged
//! when pages are processed concurrently from spawned tasks.
//!
//! # Example
//!
//! ```rust
//! use foliomd::{ConversionProgress, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingProgress {
//!     completed: AtomicUsize,
//! }
//!
//! impl ConversionProgress for CountingProgress {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done} done: page {page_num}/{total_pages} ({markdown_len} bytes)");
//!     }
//! }
//!
//! let counter = Arc::new(CountingProgress {
//!     completed: AtomicUsize::new(0),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress(counter as Arc<dyn ConversionProgress>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Receiver for pipeline events during a conversion.
///
/// Every method has an empty default body, so implementors override only the
/// events they care about. The page events arrive from whichever worker
/// finishes first, possibly in parallel; implementations guard shared state
/// with atomics or a `Mutex` (the trait requires `Send + Sync` for exactly
/// this reason).
#[allow(unused_variables)]
pub trait ConversionProgress: Send + Sync {
    /// Runs once before any page, with the number of pages that will
    /// actually be processed (after page selection).
    fn on_conversion_start(&self, total_pages: usize) {}

    /// Runs as a page enters layout detection. `page_num` is 1-indexed.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {}

    /// Runs when every stage of a page succeeded. `markdown_len` is the
    /// byte length of the page's cleaned Markdown.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {}

    /// Runs when a stage of this page failed.
    ///
    /// The page may still carry best-effort Markdown; `error` is the
    /// recorded [`PageError`](crate::PageError), rendered for humans.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {}

    /// Runs last, with the selected page count and how many pages
    /// converted without error.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {}
}

/// Ignores every event; stands in when no callback is configured.
pub struct NoopProgress;

impl ConversionProgress for NoopProgress {}

/// Alias for the callback slot in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgress>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct EventLedger {
        begun: AtomicUsize,
        finished: AtomicUsize,
        failed: AtomicUsize,
        announced: AtomicUsize,
        summarised: AtomicUsize,
    }

    impl ConversionProgress for EventLedger {
        fn on_conversion_start(&self, total_pages: usize) {
            self.announced.store(total_pages, Ordering::SeqCst);
        }

        fn on_page_start(&self, _page: usize, _total: usize) {
            self.begun.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page: usize, _total: usize, _len: usize) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page: usize, _total: usize, _error: String) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_complete(&self, _total: usize, success: usize) {
            self.summarised.store(success, Ordering::SeqCst);
        }
    }

    #[test]
    fn default_methods_are_callable_on_a_noop() {
        let cb = NoopProgress;
        cb.on_conversion_start(7);
        cb.on_page_start(1, 7);
        cb.on_page_complete(1, 7, 64);
        cb.on_page_error(2, 7, "render backend crashed".to_string());
        cb.on_conversion_complete(7, 6);
    }

    #[test]
    fn an_observer_sees_every_event() {
        let ledger = EventLedger::default();

        ledger.on_conversion_start(3);
        assert_eq!(ledger.announced.load(Ordering::SeqCst), 3);

        ledger.on_page_start(1, 3);
        ledger.on_page_complete(1, 3, 100);
        ledger.on_page_start(2, 3);
        ledger.on_page_complete(2, 3, 200);
        ledger.on_page_start(3, 3);
        ledger.on_page_error(3, 3, "OCR backend crashed".to_string());

        assert_eq!(ledger.begun.load(Ordering::SeqCst), 3);
        assert_eq!(ledger.finished.load(Ordering::SeqCst), 2);
        assert_eq!(ledger.failed.load(Ordering::SeqCst), 1);

        ledger.on_conversion_complete(3, 2);
        assert_eq!(ledger.summarised.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn events_reach_an_arc_dyn_callback() {
        let cb: Arc<dyn ConversionProgress> = Arc::new(NoopProgress);
        cb.on_conversion_start(12);
        cb.on_page_start(1, 12);
        cb.on_page_complete(1, 12, 2048);
    }
}
