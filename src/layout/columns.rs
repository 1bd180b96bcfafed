//! Column segmentation: group regions into vertical reading columns.
//!
//! The x-axis is cut into fixed-width bins and every non-full-width region
//! projects its horizontal span onto them. Contiguous runs of untouched bins
//! that are wide enough, and that lie strictly between touched bins, are the
//! gutters between columns. A page with no qualifying gutter is a single
//! column.
//!
//! ## Why a histogram
//!
//! Column boundaries are a property of the whole page, not of any region
//! pair: two paragraphs may overlap horizontally by accident while the
//! gutter stays empty down the entire page. Projecting onto bins makes the
//! gutter visible as a low-coverage run regardless of how individual boxes
//! jitter. Boxes too wide to be a member of any column (wider than
//! [`WIDE_EXCLUDE_RATIO`] of the content span) are left out of the
//! projection so a figure bridging the gutter does not erase it; they are
//! still assigned to a column afterwards by greatest overlap. Grid layouts
//! (multiple column sets stacked in rows) are not segmented further; they
//! degrade to the vertical columns found here.

use tracing::debug;

use super::region::{PageExtent, Region};
use super::OrderConfig;

/// Horizontal resolution of the coverage histogram, in page pixels.
const BIN_WIDTH: f32 = 4.0;

/// Regions wider than this fraction of the content span do not contribute
/// coverage. A box that wide cannot sit inside one column of a two-column
/// layout, so letting it vote would only hide the gutter it straddles.
const WIDE_EXCLUDE_RATIO: f32 = 0.6;

/// One vertical reading column.
#[derive(Debug, Clone)]
pub(super) struct Column {
    /// Horizontal extent: from the previous cut (or the content edge) to the
    /// next. Non-overlapping across the page's columns.
    pub x_span: (f32, f32),
    /// Indices into the engine's valid-region slice, sorted top-to-bottom
    /// by `(y_min, x_min, id)`.
    pub members: Vec<usize>,
}

/// Output of segmentation: columns left-to-right plus the full-width regions
/// excluded from column grouping.
#[derive(Debug)]
pub(super) struct Segmentation {
    pub columns: Vec<Column>,
    pub full_width: Vec<usize>,
}

/// Split `regions` (all pre-validated) into columns and full-width regions.
pub(super) fn segment(regions: &[Region], config: &OrderConfig, page: PageExtent) -> Segmentation {
    let full_cut = config.full_width_ratio * page.width;

    let mut normal: Vec<usize> = Vec::with_capacity(regions.len());
    let mut full_width: Vec<usize> = Vec::new();
    for (i, r) in regions.iter().enumerate() {
        if r.bbox.width() >= full_cut {
            full_width.push(i);
        } else {
            normal.push(i);
        }
    }

    if normal.is_empty() {
        return Segmentation {
            columns: Vec::new(),
            full_width,
        };
    }

    let content_min = normal
        .iter()
        .map(|&i| regions[i].bbox.x_min)
        .fold(f32::INFINITY, f32::min);
    let content_max = normal
        .iter()
        .map(|&i| regions[i].bbox.x_max)
        .fold(f32::NEG_INFINITY, f32::max);

    let boundaries = gap_boundaries(regions, &normal, content_min, content_max, config);
    debug!(
        "segmented {} regions: {} full-width, {} column boundaries",
        regions.len(),
        full_width.len(),
        boundaries.len()
    );

    // Column spans between consecutive boundaries, page edges implied.
    let mut cuts = Vec::with_capacity(boundaries.len() + 2);
    cuts.push(content_min);
    cuts.extend(boundaries);
    cuts.push(content_max);

    let mut columns: Vec<Column> = cuts
        .windows(2)
        .map(|w| Column {
            x_span: (w[0], w[1]),
            members: Vec::new(),
        })
        .collect();

    // Greatest-overlap assignment; strict `>` keeps ties on the leftmost
    // column because spans are visited left to right.
    for &i in &normal {
        let b = &regions[i].bbox;
        let mut best = 0usize;
        let mut best_overlap = f32::NEG_INFINITY;
        for (c, col) in columns.iter().enumerate() {
            let overlap = b.span_overlap(col.x_span.0, col.x_span.1);
            if overlap > best_overlap {
                best_overlap = overlap;
                best = c;
            }
        }
        columns[best].members.push(i);
    }

    // A span can end up empty when everything overlapping it was pulled into
    // a neighbour; such spans are not columns.
    columns.retain(|c| !c.members.is_empty());

    // x_span stays the cut span, not the members' extent: cut spans are
    // non-overlapping across columns even when a straddler joins one.
    for col in &mut columns {
        col.members.sort_by(|&a, &b| {
            let (ra, rb) = (&regions[a], &regions[b]);
            ra.bbox
                .y_min
                .total_cmp(&rb.bbox.y_min)
                .then(ra.bbox.x_min.total_cmp(&rb.bbox.x_min))
                .then(ra.id.cmp(&rb.id))
        });
    }

    Segmentation {
        columns,
        full_width,
    }
}

/// Find gutter centers: empty bin runs of at least `min_gap_width`, strictly
/// between covered bins. Only column-sized regions contribute coverage.
fn gap_boundaries(
    regions: &[Region],
    normal: &[usize],
    content_min: f32,
    content_max: f32,
    config: &OrderConfig,
) -> Vec<f32> {
    let content_span = content_max - content_min;
    if !(content_span > 0.0) {
        return Vec::new();
    }

    let wide_cut = WIDE_EXCLUDE_RATIO * content_span;
    let counted: Vec<usize> = normal
        .iter()
        .copied()
        .filter(|&i| regions[i].bbox.width() < wide_cut)
        .collect();
    if counted.is_empty() {
        return Vec::new();
    }

    // Histogram over the counted regions' own extent, so its first and last
    // bins are covered and every qualifying run is interior.
    let hist_min = counted
        .iter()
        .map(|&i| regions[i].bbox.x_min)
        .fold(f32::INFINITY, f32::min);
    let hist_max = counted
        .iter()
        .map(|&i| regions[i].bbox.x_max)
        .fold(f32::NEG_INFINITY, f32::max);
    let span = hist_max - hist_min;
    if !(span > 0.0) {
        return Vec::new();
    }

    let nbins = ((span / BIN_WIDTH).ceil() as usize).max(1);
    let mut coverage = vec![0u32; nbins];
    for &i in &counted {
        let b = &regions[i].bbox;
        let lo = (((b.x_min - hist_min) / BIN_WIDTH).floor() as usize).min(nbins - 1);
        let hi = ((((b.x_max - hist_min) / BIN_WIDTH).ceil() as usize).max(lo + 1)).min(nbins);
        for bin in &mut coverage[lo..hi] {
            *bin += 1;
        }
    }

    let min_run = ((config.min_gap_width / BIN_WIDTH).ceil() as usize).max(1);
    let mut boundaries = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &c) in coverage.iter().enumerate() {
        match (c, run_start) {
            (0, None) => run_start = Some(i),
            (0, Some(_)) => {}
            (_, Some(start)) => {
                let len = i - start;
                if len >= min_run {
                    let center = hist_min + BIN_WIDTH * (start as f32 + len as f32 / 2.0);
                    boundaries.push(center);
                }
                run_start = None;
            }
            (_, None) => {}
        }
    }
    // A trailing zero run is never emitted: the loop only closes runs on a
    // covered bin, and the final bin is covered by whichever counted region
    // defines hist_max.

    boundaries
}
