//! PDF rasterisation: render selected pages to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not be driven from an async context. Each entry point here
//! hops onto `tokio::task::spawn_blocking` so CPU-heavy rasterisation never
//! stalls a Tokio worker thread.
//!
//! ## DPI and the pixel cap
//!
//! The target width comes from the page's physical size and `dpi` (PDF
//! points are 1/72 inch). `max_rendered_pixels` then caps either edge, so an
//! A0 poster cannot balloon into a 17 000 px bitmap no matter what DPI asks
//! for. Detection, ordering and cropping all work on this one render, which
//! keeps every stage's pixel coordinates in the same space.

use std::path::Path;

use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

use crate::config::ConversionConfig;
use crate::error::{FoliomdError, PageError};
use crate::output::DocumentMetadata;

/// Binds the pdfium shared library.
///
/// `PDFIUM_LIB_PATH` wins when set; otherwise a platform-named library next
/// to the working directory is tried, then the system search path.
fn bind_pdfium() -> Result<Pdfium, FoliomdError> {
    let explicit = std::env::var("PDFIUM_LIB_PATH")
        .ok()
        .filter(|p| !p.is_empty());
    let bindings = match explicit {
        Some(path) => Pdfium::bind_to_library(&path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| FoliomdError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Opens a document, telling password problems apart from corruption.
fn load_document<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, FoliomdError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let detail = format!("{e:?}");
        let path = pdf_path.to_path_buf();
        // pdfium reports bad and missing passwords with the same error code,
        // so whether one was supplied decides which variant fits.
        if detail.to_ascii_lowercase().contains("password") {
            match password {
                Some(_) => FoliomdError::WrongPassword { path },
                None => FoliomdError::PasswordRequired { path },
            }
        } else {
            FoliomdError::CorruptPdf { path, detail }
        }
    })
}

/// Render the selected pages of a PDF to bitmaps.
///
/// Returns one `(zero-based index, render result)` tuple per surviving
/// index. Document-level problems (missing library, corrupt file, wrong
/// password) are fatal; a single page that fails to render is returned as
/// its [`PageError`] so sibling pages proceed.
pub async fn render_pages(
    pdf_path: &Path,
    config: &ConversionConfig,
    page_indices: &[usize],
) -> Result<Vec<(usize, Result<DynamicImage, PageError>)>, FoliomdError> {
    let path = pdf_path.to_owned();
    let (dpi, cap) = (config.dpi, config.max_rendered_pixels);
    let pwd = config.password.clone();
    let wanted = page_indices.to_vec();

    tokio::task::spawn_blocking(move || rasterise(&path, dpi, cap, pwd.as_deref(), &wanted))
        .await
        .map_err(|e| FoliomdError::Internal(format!("render task panicked: {e}")))?
}

fn rasterise(
    pdf_path: &Path,
    dpi: u32,
    cap: u32,
    password: Option<&str>,
    wanted: &[usize],
) -> Result<Vec<(usize, Result<DynamicImage, PageError>)>, FoliomdError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, pdf_path, password)?;
    let pages = document.pages();
    let page_count = pages.len() as usize;
    info!(pages = page_count, "document opened for rendering");

    let mut rendered = Vec::with_capacity(wanted.len());
    for &idx in wanted {
        if idx >= page_count {
            warn!(page = idx + 1, total = page_count, "page out of range, skipping");
            continue;
        }
        let outcome = render_one(&pages, idx, dpi, cap);
        if let Err(e) = &outcome {
            warn!(page = idx + 1, "{e}");
        }
        rendered.push((idx, outcome));
    }
    Ok(rendered)
}

/// Renders a single page at `dpi`, clamping both edges to `cap` pixels.
fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    dpi: u32,
    cap: u32,
) -> Result<DynamicImage, PageError> {
    let fail = |e: PdfiumError| PageError::RenderFailed {
        page: idx + 1,
        detail: format!("{e:?}"),
    };
    let page = pages.get(idx as u16).map_err(fail)?;

    // Points are 1/72 inch; pdfium keeps the aspect ratio when only the
    // width is pinned.
    let width_px = ((page.width().value / 72.0) * dpi as f32).round() as i32;
    let settings = PdfRenderConfig::new()
        .set_target_width(width_px.clamp(1, cap as i32))
        .set_maximum_height(cap as i32);

    let image = page.render_with_config(&settings).map_err(fail)?.as_image();
    debug!(
        page = idx + 1,
        width = image.width(),
        height = image.height(),
        "page rasterised"
    );
    Ok(image)
}

/// Read document properties without rendering anything.
pub async fn extract_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, FoliomdError> {
    let path = pdf_path.to_owned();
    let pwd = password.map(str::to_string);

    tokio::task::spawn_blocking(move || read_metadata(&path, pwd.as_deref()))
        .await
        .map_err(|e| FoliomdError::Internal(format!("metadata task panicked: {e}")))?
}

fn read_metadata(
    pdf_path: &Path,
    password: Option<&str>,
) -> Result<DocumentMetadata, FoliomdError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, pdf_path, password)?;
    let tags = document.metadata();

    let field = |tag: PdfDocumentMetadataTagType| {
        tags.get(tag)
            .map(|t| t.value().to_string())
            .filter(|v| !v.is_empty())
    };

    Ok(DocumentMetadata {
        title: field(PdfDocumentMetadataTagType::Title),
        author: field(PdfDocumentMetadataTagType::Author),
        subject: field(PdfDocumentMetadataTagType::Subject),
        creator: field(PdfDocumentMetadataTagType::Creator),
        producer: field(PdfDocumentMetadataTagType::Producer),
        creation_date: field(PdfDocumentMetadataTagType::CreationDate),
        modification_date: field(PdfDocumentMetadataTagType::ModificationDate),
        page_count: document.pages().len() as usize,
        pdf_version: Some(format!("{:?}", document.version())),
        is_encrypted: false, // not exposed by pdfium once the document is open
    })
}
