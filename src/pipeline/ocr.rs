//! OCR boundary and fragment gathering.
//!
//! Like layout detection, text recognition is pluggable: the [`OcrEngine`]
//! trait hides whichever backend the caller wires in. This module walks the
//! ranked regions of a page, crops each one, and turns recognition results
//! into the ordered [`PageFragment`] list that reassembly consumes.

use image::DynamicImage;
use tracing::{debug, warn};

use crate::config::ConversionConfig;
use crate::error::PageError;
use crate::layout::Region;
use crate::pipeline::clips;
use crate::pipeline::detect::BoxError;
use crate::pipeline::reassemble::PageFragment;

/// A text recognition backend.
///
/// Receives the cropped image of one region and returns its text. An empty
/// string is a valid answer (nothing legible in the region). `Send + Sync`
/// because pages are processed concurrently.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, region: &DynamicImage) -> Result<String, BoxError>;
}

/// Walks the ranked regions of a page and gathers reassembly fragments.
///
/// Figures and tables are cropped and rendered per the clip mode; every other
/// kind is cropped and sent to OCR. Regions whose recognised text is empty
/// are skipped. On the first OCR failure the walk stops and the page
/// continues with the fragments gathered so far, carrying the error.
///
/// Returns the fragments, the count of regions with non-empty text, and the
/// OCR error if one occurred.
pub(crate) fn gather_fragments(
    engine: &dyn OcrEngine,
    page_num: usize,
    image: &DynamicImage,
    ordered: &[&Region],
    config: &ConversionConfig,
) -> (Vec<PageFragment>, usize, Option<PageError>) {
    let mut fragments = Vec::with_capacity(ordered.len());
    let mut recognized = 0;
    for region in ordered {
        if region.kind.is_illustration() {
            fragments.push(PageFragment::Illustration {
                kind: region.kind,
                markdown: clips::illustration_markdown(image, region, page_num, &config.clip_mode),
            });
            continue;
        }
        let clip = clips::crop_region(image, region);
        match engine.recognize(&clip) {
            Ok(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    debug!(
                        page = page_num,
                        region = region.id,
                        "empty recognition result, skipping region"
                    );
                    continue;
                }
                recognized += 1;
                fragments.push(PageFragment::Text {
                    kind: region.kind,
                    text: trimmed.to_string(),
                });
            }
            Err(e) => {
                warn!(
                    page = page_num,
                    region = region.id,
                    gathered = fragments.len(),
                    "OCR failed, continuing page with fragments gathered so far: {e}"
                );
                let error = PageError::OcrFailed {
                    page: page_num,
                    region: region.id,
                    detail: e.to_string(),
                };
                return (fragments, recognized, Some(error));
            }
        }
    }
    (fragments, recognized, None)
}
