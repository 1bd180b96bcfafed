//! Region data model: one detected layout box with type and geometry.
//!
//! Regions are plain data. They arrive from a layout detector (or a layout
//! dump file), are validated against the page extent, and flow through the
//! reading-order engine by value. Nothing here carries behavior beyond
//! geometry helpers; ordering policy lives in the sibling modules.

use serde::{Deserialize, Serialize};

/// An axis-aligned bounding box in page-pixel coordinates, y increasing
/// downward.
///
/// Serialized as a compact `[x_min, y_min, x_max, y_max]` array, the shape
/// layout detectors commonly dump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    /// Length of the horizontal overlap between two boxes (0 when disjoint).
    pub fn h_overlap(&self, other: &BBox) -> f32 {
        (self.x_max.min(other.x_max) - self.x_min.max(other.x_min)).max(0.0)
    }

    /// Length of the horizontal overlap with an arbitrary `[lo, hi]` span.
    pub fn span_overlap(&self, lo: f32, hi: f32) -> f32 {
        (self.x_max.min(hi) - self.x_min.max(lo)).max(0.0)
    }

    /// True when every coordinate is a finite number.
    pub fn is_finite(&self) -> bool {
        self.x_min.is_finite()
            && self.y_min.is_finite()
            && self.x_max.is_finite()
            && self.y_max.is_finite()
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x_min, b.y_min, b.x_max, b.y_max]
    }
}

/// The closed set of layout region types.
///
/// Exhaustively matched in the graph builder and the markdown emitters, so a
/// new type is a compile-time decision point rather than a silently ignored
/// string. The serde aliases accept the label vocabulary of the common
/// PP-Structure style detectors (`figure caption`, `equation`, `reference`,
/// ...) so their dumps load without a translation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    Title,
    #[serde(alias = "reference", alias = "plain text")]
    Text,
    #[serde(alias = "image")]
    Figure,
    Table,
    #[serde(
        alias = "figure caption",
        alias = "figure_caption",
        alias = "table caption",
        alias = "table_caption"
    )]
    Caption,
    Footer,
    Header,
    #[serde(alias = "equation", alias = "isolated formula")]
    Formula,
    List,
}

impl RegionKind {
    /// Lowercase label, matching the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            RegionKind::Title => "title",
            RegionKind::Text => "text",
            RegionKind::Figure => "figure",
            RegionKind::Table => "table",
            RegionKind::Caption => "caption",
            RegionKind::Footer => "footer",
            RegionKind::Header => "header",
            RegionKind::Formula => "formula",
            RegionKind::List => "list",
        }
    }

    /// Figures and tables are cropped and linked as images, never OCR'd.
    pub fn is_illustration(&self) -> bool {
        matches!(self, RegionKind::Figure | RegionKind::Table)
    }

    /// Running headers and footers: page furniture, dropped from prose
    /// output unless explicitly kept.
    pub fn is_furniture(&self) -> bool {
        matches!(self, RegionKind::Header | RegionKind::Footer)
    }
}

impl std::fmt::Display for RegionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One detected layout region on a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Stable integer id, unique per page.
    pub id: u32,
    pub bbox: BBox,
    pub kind: RegionKind,
}

impl Region {
    pub fn new(id: u32, bbox: BBox, kind: RegionKind) -> Self {
        Self { id, bbox, kind }
    }
}

/// Pixel dimensions of the page the regions were detected on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageExtent {
    pub width: f32,
    pub height: f32,
}

impl PageExtent {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Extent of an already-rasterised page image.
    pub fn of_image(img: &image::DynamicImage) -> Self {
        Self::new(img.width() as f32, img.height() as f32)
    }

    fn contains(&self, b: &BBox) -> bool {
        b.x_min >= 0.0 && b.y_min >= 0.0 && b.x_max <= self.width && b.y_max <= self.height
    }
}

/// Why a region was excluded from ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Non-positive width or height, or a NaN/infinite coordinate.
    EmptyBounds,
    /// The bbox reaches outside the page extent.
    OutOfPage,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyBounds => f.write_str("empty or non-finite bounds"),
            RejectReason::OutOfPage => f.write_str("outside the page extent"),
        }
    }
}

/// Validate one region against the page extent.
///
/// The `!(.. > 0.0)` form deliberately catches NaN: any comparison with NaN
/// is false, which routes degenerate boxes into `EmptyBounds`.
pub(crate) fn check(region: &Region, page: PageExtent) -> Result<(), RejectReason> {
    let b = &region.bbox;
    if !b.is_finite() || !(b.width() > 0.0) || !(b.height() > 0.0) {
        return Err(RejectReason::EmptyBounds);
    }
    if !page.contains(b) {
        return Err(RejectReason::OutOfPage);
    }
    Ok(())
}
