//! Pipeline stages for document-to-Markdown conversion.
//!
//! One submodule per stage, each testable on its own; the pluggable stages
//! (detection, OCR) hide their backends behind traits so swapping one never
//! touches its neighbours.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ detect ──▶ [layout engine] ──▶ ocr ──▶ reassemble ──▶ postprocess
//! (URL/path) (pdfium)  (regions)  (reading order)    (text)   (markdown)      (cleanup)
//! ```
//!
//! 1. [`input`]  — resolve the user-supplied path or URL to a local PDF
//! 2. [`render`] — rasterise the selected pages; wrapped in `spawn_blocking`
//!    since pdfium is not async-safe
//! 3. [`detect`] — run the layout detector and turn its raw boxes into
//!    candidate regions; the ordering itself lives in [`crate::layout`]
//! 4. [`clips`]  — crop per-region images and render illustration Markdown
//! 5. [`ocr`]    — recognise text for each ranked region, in reading order
//! 6. [`reassemble`] — merge ordered fragments into page Markdown, via the
//!    LLM (with retry/backoff; the only stage with network I/O) or the
//!    deterministic heuristic
//! 7. [`postprocess`] — text-cleanup rules shared by both reassembly modes
//!    (markdown fences, empty image links, broken tables, etc.)

pub mod clips;
pub mod detect;
pub mod input;
pub mod ocr;
pub mod postprocess;
pub mod reassemble;
pub mod render;
