//! # foliomd
//!
//! Convert scanned and digital documents to Markdown, with layout-aware
//! reading order.
//!
//! ## Why this crate?
//!
//! Layout detectors and OCR engines answer *what* is on a page — text blocks,
//! titles, figures, tables — but not *in which order a human reads them*.
//! Concatenating regions top-to-bottom garbles every multi-column page and
//! tears captions away from their figures. The heart of this crate is a
//! deterministic reading-order engine: it segments each page into columns
//! from the horizontal whitespace, builds a precedence graph (column chains,
//! caption glue, full-width barriers), and ranks all regions with a stable
//! topological pass. Around the engine sits a full pipeline that turns a PDF
//! into clean Markdown.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Detect    layout regions from the injected [`LayoutDetector`]
//!  ├─ 4. Order     column segmentation → precedence graph → ranking
//!  ├─ 5. Recognise per-region OCR in reading order; figures become clips
//!  ├─ 6. Reassemble ordered fragments → page Markdown (LLM or heuristic)
//!  ├─ 7. Polish    11-rule post-processing (fences, tables, whitespace)
//!  └─ 8. Output    assembled Markdown + per-page stats
//! ```
//!
//! ## Quick Start: ordering regions
//!
//! The engine is pure and needs no detector, OCR, or network:
//!
//! ```rust
//! use foliomd::{PageExtent, ReadingOrderEngine, Region, RegionKind};
//!
//! let engine = ReadingOrderEngine::with_defaults();
//! let regions = vec![
//!     // a full-width title above two columns
//!     Region::new(0, [0.0, 0.0, 800.0, 40.0].into(), RegionKind::Title),
//!     Region::new(1, [10.0, 60.0, 380.0, 900.0].into(), RegionKind::Text),
//!     Region::new(2, [420.0, 60.0, 790.0, 900.0].into(), RegionKind::Text),
//! ];
//! let order = engine.reconstruct(&regions, PageExtent::new(800.0, 1000.0));
//! assert_eq!(order.ranked, vec![0, 1, 2]);
//! ```
//!
//! ## Quick Start: full conversion
//!
//! Detection and OCR are trait seams: wire in whichever models you run.
//!
//! ```rust,no_run
//! use foliomd::{convert, ConversionConfig, ReassemblyMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     # let detector: std::sync::Arc<dyn foliomd::LayoutDetector> = unimplemented!();
//!     # let ocr: std::sync::Arc<dyn foliomd::OcrEngine> = unimplemented!();
//!     let config = ConversionConfig::builder()
//!         .detector(detector) // your layout model
//!         .ocr_engine(ocr) // your text recogniser
//!         .reassembly(ReassemblyMode::Heuristic) // or Llm + an API key
//!         .build()?;
//!     let output = convert("document.pdf", &config).await?;
//!     println!("{}", output.markdown);
//!     eprintln!(
//!         "{} regions ordered, {} pages",
//!         output.stats.regions_detected, output.stats.processed_pages
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Reassembly Modes
//!
//! | Mode | Network | Output |
//! |------|---------|--------|
//! | `ReassemblyMode::Llm` (default) | yes — gpt-4.1-nano / claude / gemini / … | fragments merged and re-punctuated by the model |
//! | `ReassemblyMode::Heuristic` | none | deterministic per-kind mapping (titles → `##`, formulas → `$`, captions → emphasis) |
//!
//! LLM mode falls back to the heuristic rendering when the provider keeps
//! failing, so a page always carries its best-effort Markdown.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `foliomd` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! foliomd = { version = "0.1", default-features = false }
//! ```

// ── Crate layout ─────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod layout;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Flat public surface ──────────────────────────────────────────────────

pub use config::{
    ClipMode, ConversionConfig, ConversionConfigBuilder, PageSelection, PageSeparator,
    ReassemblyMode,
};
pub use convert::{
    convert, convert_from_bytes, convert_pages, convert_sync, convert_to_file, inspect,
};
pub use error::{FoliomdError, PageError};
pub use layout::{
    BBox, ColumnDirection, OrderConfig, PageExtent, ReadingOrder, ReadingOrderEngine, Region,
    RegionKind, RejectReason, RejectedRegion,
};
pub use output::{ConversionOutput, ConversionStats, DocumentMetadata, PageResult};
pub use pipeline::detect::{read_layout_dump, BoxError, Detection, LayoutDetector, PageLayout};
pub use pipeline::ocr::OcrEngine;
pub use progress::{ConversionProgress, NoopProgress, ProgressCallback};
pub use stream::{convert_stream, convert_stream_from_bytes, PageStream};
