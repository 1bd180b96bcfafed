//! Error types for the foliomd library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FoliomdError`] — **Fatal**: the conversion cannot proceed at all
//!   (bad input file, wrong password, invalid configuration, no layout
//!   detector wired in). Returned as `Err(FoliomdError)` from the top-level
//!   `convert*` functions and from [`crate::layout::ReadingOrderEngine::new`].
//!
//! * [`PageError`] — **Non-fatal**: a single page failed (render glitch,
//!   detector error, transient API error) but all other pages are fine.
//!   Stored inside [`crate::output::PageResult`] so callers can inspect
//!   partial success rather than losing the whole document to one bad page.
//!
//! The separation lets callers decide their own tolerance: abort on the first
//! page failure, log and continue, or collect all errors for a post-run report.
//!
//! Malformed layout regions are a third, milder tier: they are not errors at
//! all. The reading-order engine drops them individually and reports their ids
//! through [`crate::layout::ReadingOrder::rejected`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the foliomd library.
///
/// A page that fails on its own travels as a [`PageError`] inside
/// [`crate::output::PageResult`] instead of surfacing here.
#[derive(Debug, Error)]
pub enum FoliomdError {
    // ── Resolving the input ───────────────────────────────────────────────
    /// No file at the given path.
    #[error("Input file not found: '{path}'\nCheck that the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file exists but this process cannot read it.
    #[error("No read permission on '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string names neither a file nor an http(s) URL.
    #[error("Input '{input}' is neither an existing file path nor an HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// The URL parsed but the transfer failed.
    #[error("Download of '{url}' failed: {reason}\nCheck the network and retry.")]
    DownloadFailed { url: String, reason: String },

    /// The transfer ran past the configured allowance.
    #[error("'{url}' did not finish downloading within {secs}s\nRaise --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Readable, but the magic bytes say it is not a PDF.
    #[error("'{path}' is not a PDF\nLeading bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Opening the document ──────────────────────────────────────────────
    /// pdfium could not parse the document structure.
    #[error("Cannot parse PDF '{path}': {detail}\nA repair pass may help: qpdf --decrypt in.pdf out.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Encrypted document opened without a password.
    #[error("'{path}' is encrypted; a password is required.\nPass it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// The supplied password does not open the document.
    #[error("The password does not open '{path}'")]
    WrongPassword { path: PathBuf },

    /// A selected page number lies beyond the last page.
    #[error("Page {page} does not exist; the document has {total} pages")]
    PageOutOfRange { page: usize, total: usize },

    // ── Collaborator errors ───────────────────────────────────────────────
    /// Full conversion was requested but no layout detector is wired in.
    #[error(
        "No layout detector is configured.\n\
        Inject one with ConversionConfig::builder().detector(..), or run in\n\
        layout-only mode against a detector dump (see LayoutDump)."
    )]
    DetectorNotConfigured,

    /// Full conversion was requested but no OCR engine is wired in.
    #[error(
        "No OCR engine is configured.\n\
        Inject one with ConversionConfig::builder().ocr_engine(..); figures and\n\
        tables alone can be converted without OCR in layout-only mode."
    )]
    OcrNotConfigured,

    /// The configured LLM provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Aggregate page failures ───────────────────────────────────────────
    /// Nothing converted; returning output would hide total failure.
    #[error("All {total} pages failed ({retries} retries each).\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    /// At least one page failed while others succeeded.
    ///
    /// Produced by [`crate::output::ConversionOutput::into_result`] for
    /// callers that treat any page failure as fatal.
    #[error("{failed}/{total} pages failed during conversion")]
    PartialFailure {
        success: usize,
        failed: usize,
        total: usize,
    },

    // ── Writing output ────────────────────────────────────────────────────
    /// Could not create or write the output Markdown file or a clip file.
    #[error("Could not write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A layout dump file could not be read or parsed.
    #[error("Invalid layout dump '{path}': {detail}\nExpected JSON: [{{\"page\": .., \"width\": .., \"height\": .., \"regions\": [..]}}]")]
    LayoutDumpInvalid { path: PathBuf, detail: String },

    // ── Validation ────────────────────────────────────────────────────────
    /// Builder or engine validation failed.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    // ── Native library ────────────────────────────────────────────────────
    /// No pdfium library could be loaded.
    #[error(
        "Could not bind the pdfium library: {0}\n\n\
Install a PDFium build for this platform and either place it on the loader\n\
path or point PDFIUM_LIB_PATH at the shared library file.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Fallback ──────────────────────────────────────────────────────────
    /// Bug guard; not expected in normal operation.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure scoped to one page.
///
/// Recorded on the page's [`crate::output::PageResult`]; the run keeps
/// going unless every page ends up here.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// pdfium could not rasterise this page.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The layout detector returned an error for this page.
    #[error("Page {page}: layout detection failed: {detail}")]
    DetectionFailed { page: usize, detail: String },

    /// OCR failed on one region; the page continues with what was gathered.
    #[error("Page {page}: OCR failed on region {region}: {detail}")]
    OcrFailed {
        page: usize,
        region: u32,
        detail: String,
    },

    /// LLM reassembly failed after retries.
    ///
    /// The page's markdown falls back to the heuristic rendering, so this
    /// error marks degraded output rather than a missing page.
    #[error("Page {page}: reassembly failed after {retries} retries: {detail}")]
    ReassemblyFailed {
        page: usize,
        retries: u8,
        detail: String,
    },

    /// LLM reassembly call timed out.
    #[error("Page {page}: reassembly timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },
}
