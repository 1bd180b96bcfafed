//! Result types returned by the conversion entry points.
//!
//! Everything here derives `Serialize`/`Deserialize` so a [`ConversionOutput`]
//! can be dumped as JSON from the CLI (`--json`) or persisted and reloaded by
//! callers that archive conversion runs.

use serde::{Deserialize, Serialize};

use crate::error::{FoliomdError, PageError};
use crate::layout::RejectedRegion;

/// Outcome of converting a single page.
///
/// A `PageResult` is always produced, even when a stage failed: `markdown`
/// then holds whatever best-effort output the page salvaged (possibly empty)
/// and `error` records what went wrong. Sibling pages are never affected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number in the source document.
    pub page_num: usize,
    /// Markdown for this page, after post-processing.
    pub markdown: String,
    /// Regions that passed validation and were ranked by the ordering engine.
    pub regions_detected: usize,
    /// Malformed detections excluded from ordering, with the reason each was
    /// turned away.
    pub rejected_regions: Vec<RejectedRegion>,
    /// Text regions that produced a non-empty recognition result.
    pub regions_recognized: usize,
    /// Ordering edges discarded while resolving contradictory layout
    /// constraints on this page.
    pub dropped_edges: usize,
    /// Tokens sent to the reassembly model (0 in heuristic mode).
    pub input_tokens: u64,
    /// Tokens received from the reassembly model (0 in heuristic mode).
    pub output_tokens: u64,
    /// Wall-clock time spent on this page, from detection through
    /// post-processing.
    pub duration_ms: u64,
    /// Reassembly retries consumed before the page succeeded or gave up.
    pub retries: u8,
    /// First stage failure on this page, if any.
    pub error: Option<PageError>,
}

impl PageResult {
    /// An empty result scaffold for `page_num`; stages fill in their fields.
    pub(crate) fn new(page_num: usize) -> Self {
        Self {
            page_num,
            markdown: String::new(),
            regions_detected: 0,
            rejected_regions: Vec::new(),
            regions_recognized: 0,
            dropped_edges: 0,
            input_tokens: 0,
            output_tokens: 0,
            duration_ms: 0,
            retries: 0,
            error: None,
        }
    }

    /// True when every stage on this page completed.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Document-level metadata extracted from the PDF information dictionary.
///
/// String fields are `None` when the document does not carry them or carries
/// an empty value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    /// Total pages in the document, before page selection.
    pub page_count: usize,
    /// PDF specification version, e.g. `"1.7"`.
    pub pdf_version: Option<String>,
    pub is_encrypted: bool,
}

/// Aggregate counters for a whole conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// Pages that converted without a page error.
    pub processed_pages: usize,
    /// Pages that carried a [`PageError`].
    pub failed_pages: usize,
    /// Pages excluded by the page selection.
    pub skipped_pages: usize,
    /// Valid regions ranked across all pages.
    pub regions_detected: usize,
    /// Malformed detections excluded across all pages.
    pub regions_rejected: usize,
    /// Text regions with a non-empty recognition result across all pages.
    pub regions_recognized: usize,
    /// Ordering edges dropped across all pages.
    pub dropped_edges: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// End-to-end wall-clock time.
    pub total_duration_ms: u64,
    /// Time spent rasterising pages (0 when pre-rendered images were given).
    pub render_duration_ms: u64,
}

/// Complete result of a conversion: assembled document plus per-page detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// The assembled Markdown document.
    pub markdown: String,
    /// Per-page results, sorted by page number.
    pub pages: Vec<PageResult>,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// Converts a partial success into an error for callers that want
    /// all-or-nothing semantics.
    ///
    /// Returns `Err(FoliomdError::PartialFailure)` when at least one page
    /// failed; the default behaviour of the entry points is to hand back the
    /// partial output and let the caller inspect `stats.failed_pages`.
    pub fn into_result(self) -> Result<Self, FoliomdError> {
        if self.stats.failed_pages > 0 {
            Err(FoliomdError::PartialFailure {
                success: self.stats.processed_pages,
                failed: self.stats.failed_pages,
                total: self.stats.total_pages,
            })
        } else {
            Ok(self)
        }
    }

    /// Results for pages that completed without error.
    pub fn successful_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| p.is_success())
    }

    /// Results for pages that carried an error.
    pub fn failed_pages(&self) -> impl Iterator<Item = &PageResult> {
        self.pages.iter().filter(|p| !p.is_success())
    }
}
