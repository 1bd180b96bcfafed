//! Clip extraction for figures and tables.
//!
//! Illustration regions are never OCR'd. The pipeline crops them out of the
//! page bitmap and emits a Markdown image whose form depends on the
//! configured [`ClipMode`]: an italic placeholder, a PNG written next to the
//! output document, or an inline base64 data URI.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat};
use tracing::warn;

use crate::config::ClipMode;
use crate::layout::Region;
use crate::pipeline::detect::BoxError;

/// Crops `region` out of the page bitmap, clamped to the image bounds.
///
/// The ordering engine has already rejected boxes outside the page extent,
/// but the bitmap can be a pixel smaller than the float extent after
/// rounding, so the crop clamps rather than trusts.
pub(crate) fn crop_region(page: &DynamicImage, region: &Region) -> DynamicImage {
    let (pw, ph) = (page.width(), page.height());
    let x0 = (region.bbox.x_min.floor().max(0.0) as u32).min(pw.saturating_sub(1));
    let y0 = (region.bbox.y_min.floor().max(0.0) as u32).min(ph.saturating_sub(1));
    let x1 = (region.bbox.x_max.ceil().max(0.0) as u32).min(pw);
    let y1 = (region.bbox.y_max.ceil().max(0.0) as u32).min(ph);
    page.crop_imm(x0, y0, x1.saturating_sub(x0).max(1), y1.saturating_sub(y0).max(1))
}

/// File name for a saved clip, stable across runs so links stay valid.
pub(crate) fn clip_file_name(page_num: usize, region_id: u32) -> String {
    format!("page-{page_num}-region-{region_id}.png")
}

/// Renders the Markdown for an illustration region per `mode`.
///
/// Encode or save failures degrade to the placeholder form with a warning;
/// a missing picture is not worth failing the page over.
pub(crate) fn illustration_markdown(
    page: &DynamicImage,
    region: &Region,
    page_num: usize,
    mode: &ClipMode,
) -> String {
    let label = region.kind.label();
    match mode {
        ClipMode::Placeholder => placeholder(label),
        ClipMode::DataUri => match encode_png(&crop_region(page, region)) {
            Ok(png) => format!(
                "![{label}](data:image/png;base64,{})",
                STANDARD.encode(&png)
            ),
            Err(e) => {
                warn!(
                    page = page_num,
                    region = region.id,
                    "clip encoding failed, emitting placeholder: {e}"
                );
                placeholder(label)
            }
        },
        ClipMode::Files { dir } => {
            let name = clip_file_name(page_num, region.id);
            match save_clip(page, region, dir, &name) {
                Ok(()) => format!("![{label}]({})", dir.join(&name).display()),
                Err(e) => {
                    warn!(
                        page = page_num,
                        region = region.id,
                        "clip save failed, emitting placeholder: {e}"
                    );
                    placeholder(label)
                }
            }
        }
    }
}

fn placeholder(label: &str) -> String {
    format!("*[{label}]*")
}

fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

fn save_clip(
    page: &DynamicImage,
    region: &Region,
    dir: &Path,
    name: &str,
) -> Result<(), BoxError> {
    std::fs::create_dir_all(dir)?;
    let png = encode_png(&crop_region(page, region))?;
    std::fs::write(dir.join(name), png)?;
    Ok(())
}
