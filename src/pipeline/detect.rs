//! Layout detection boundary.
//!
//! The ML model itself is not part of this crate: layout backends (ONNX
//! runtimes, remote vision services, fixtures in tests) live behind the
//! [`LayoutDetector`] trait. This module owns the plumbing around the trait:
//! confidence filtering, sequential id assignment, the mapping of backend
//! failures into the page error taxonomy, and the serde dump format that the
//! CLI layout mode and the test suite load detector output from.

use std::path::Path;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FoliomdError, PageError};
use crate::layout::{BBox, PageExtent, Region, RegionKind};

/// Boxed error type returned by pluggable stage implementations.
///
/// Backends keep their own error types; the pipeline only ever stringifies
/// them into a [`PageError`], so a boxed trait object is all the contract
/// needs.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A layout analysis backend.
///
/// Implementations receive one rasterised page and return raw detections in
/// any order; the pipeline filters, validates and orders them afterwards.
/// `Send + Sync` because pages are processed concurrently.
pub trait LayoutDetector: Send + Sync {
    /// Detects layout regions on a rasterised page.
    ///
    /// Coordinates are pixels in the rendered image, `(0, 0)` top-left.
    fn detect(&self, page: &DynamicImage) -> Result<Vec<Detection>, BoxError>;
}

/// One raw detection from a layout backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Box in rendered-page pixel coordinates.
    pub bbox: BBox,
    pub kind: RegionKind,
    /// Backend confidence in `[0, 1]`. Dumps that omit it get `1.0`.
    #[serde(default = "full_confidence")]
    pub score: f32,
}

fn full_confidence() -> f32 {
    1.0
}

impl Detection {
    pub fn new(bbox: BBox, kind: RegionKind, score: f32) -> Self {
        Self { bbox, kind, score }
    }
}

/// Detections for one page of a layout dump.
///
/// A dump is a JSON array of these, one element per page:
///
/// ```json
/// [{"page": 1, "width": 1240.0, "height": 1754.0,
///   "regions": [{"bbox": [72.0, 96.0, 600.0, 140.0], "kind": "title", "score": 0.98}]}]
/// ```
///
/// `kind` accepts the label vocabulary of the common PP-Structure style
/// detectors (see [`RegionKind`]), so their dumps load without translation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    /// 1-indexed page number.
    pub page: usize,
    /// Rendered page width in pixels.
    pub width: f32,
    /// Rendered page height in pixels.
    pub height: f32,
    pub regions: Vec<Detection>,
}

impl PageLayout {
    /// Candidate regions for the ordering engine, dropping detections under
    /// `min_score`. Region ids are positions in the returned vector.
    pub fn to_regions(&self, min_score: f32) -> Vec<Region> {
        regions_from_detections(&self.regions, min_score)
    }

    /// The page bounds the dump was produced at.
    pub fn extent(&self) -> PageExtent {
        PageExtent::new(self.width, self.height)
    }
}

/// Reads a layout dump written by an external detector run.
pub fn read_layout_dump(path: &Path) -> Result<Vec<PageLayout>, FoliomdError> {
    let invalid = |detail: String| FoliomdError::LayoutDumpInvalid {
        path: path.to_path_buf(),
        detail,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| invalid(e.to_string()))
}

/// Runs the detector on one page, mapping backend failures into the page
/// error taxonomy.
pub(crate) fn detect_page(
    detector: &dyn LayoutDetector,
    page_num: usize,
    image: &DynamicImage,
) -> Result<Vec<Detection>, PageError> {
    detector
        .detect(image)
        .map_err(|e| PageError::DetectionFailed {
            page: page_num,
            detail: e.to_string(),
        })
}

/// Turns raw detections into candidate regions for the ordering engine.
///
/// Detections under `min_score` are dropped (the `!(..)` form also drops NaN
/// scores); survivors get sequential ids in detector output order. Geometric
/// validation is deliberately not done here: the engine rejects malformed
/// boxes itself and reports them per id.
pub(crate) fn regions_from_detections(detections: &[Detection], min_score: f32) -> Vec<Region> {
    let mut regions = Vec::with_capacity(detections.len());
    for det in detections {
        if !(det.score >= min_score) {
            debug!(
                score = det.score,
                kind = det.kind.label(),
                "dropping low-confidence detection"
            );
            continue;
        }
        regions.push(Region::new(regions.len() as u32, det.bbox, det.kind));
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_parses_with_aliases_and_default_score() {
        let json = r#"[{
            "page": 1, "width": 800.0, "height": 1000.0,
            "regions": [
                {"bbox": [10.0, 10.0, 400.0, 60.0], "kind": "title", "score": 0.97},
                {"bbox": [10.0, 80.0, 400.0, 120.0], "kind": "figure caption"},
                {"bbox": [10.0, 140.0, 400.0, 200.0], "kind": "equation", "score": 0.55}
            ]
        }]"#;
        let pages: Vec<PageLayout> = serde_json::from_str(json).unwrap();
        assert_eq!(pages.len(), 1);
        let regions = &pages[0].regions;
        assert_eq!(regions[0].kind, RegionKind::Title);
        assert_eq!(regions[1].kind, RegionKind::Caption);
        assert_eq!(regions[1].score, 1.0);
        assert_eq!(regions[2].kind, RegionKind::Formula);
    }

    #[test]
    fn read_layout_dump_reports_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, "{not json").unwrap();
        match read_layout_dump(&path) {
            Err(FoliomdError::LayoutDumpInvalid { .. }) => {}
            other => panic!("expected LayoutDumpInvalid, got {other:?}"),
        }
    }

    #[test]
    fn low_confidence_and_nan_scores_are_dropped() {
        let dets = vec![
            Detection::new(BBox::new(0.0, 0.0, 10.0, 10.0), RegionKind::Text, 0.9),
            Detection::new(BBox::new(0.0, 20.0, 10.0, 30.0), RegionKind::Text, 0.1),
            Detection::new(BBox::new(0.0, 40.0, 10.0, 50.0), RegionKind::Text, f32::NAN),
        ];
        let regions = regions_from_detections(&dets, 0.25);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].id, 0);
    }

    #[test]
    fn ids_are_sequential_in_detector_order() {
        let dets = vec![
            Detection::new(BBox::new(0.0, 500.0, 10.0, 510.0), RegionKind::Text, 1.0),
            Detection::new(BBox::new(0.0, 20.0, 10.0, 30.0), RegionKind::Title, 1.0),
        ];
        let regions = regions_from_detections(&dets, 0.0);
        assert_eq!(regions[0].id, 0);
        assert_eq!(regions[0].kind, RegionKind::Text);
        assert_eq!(regions[1].id, 1);
        assert_eq!(regions[1].kind, RegionKind::Title);
    }
}
