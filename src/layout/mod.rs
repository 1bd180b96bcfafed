//! Reading-order reconstruction: from a bag of detected layout regions to
//! the linear order a human reader would follow.
//!
//! The engine is a pure, per-page computation in three stages:
//!
//! ```text
//!   regions ──▶ column segmentation ──▶ precedence graph ──▶ topological
//!              (coverage histogram)    (column / caption /    sequencing
//!                                       full-width edges)    (deterministic)
//! ```
//!
//! No state survives a call, so one engine can serve any number of pages
//! concurrently. Construction validates the configuration and is the only
//! fatal error path; at reconstruction time malformed regions are dropped
//! individually and graph cycles are broken locally, never escalated.
//!
//! ```
//! use foliomd::layout::{OrderConfig, PageExtent, ReadingOrderEngine, Region, RegionKind};
//!
//! let engine = ReadingOrderEngine::new(OrderConfig::default())?;
//! let regions = vec![
//!     Region::new(0, [0.0, 0.0, 800.0, 40.0].into(), RegionKind::Title),
//!     Region::new(1, [10.0, 60.0, 380.0, 200.0].into(), RegionKind::Text),
//!     Region::new(2, [420.0, 60.0, 790.0, 200.0].into(), RegionKind::Text),
//! ];
//! let order = engine.reconstruct(&regions, PageExtent::new(800.0, 1000.0));
//! assert_eq!(order.ranked, vec![0, 1, 2]);
//! # Ok::<(), foliomd::FoliomdError>(())
//! ```

mod columns;
mod graph;
mod region;
mod sequence;

pub use region::{BBox, PageExtent, Region, RegionKind, RejectReason};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FoliomdError;

/// Traversal order across columns.
///
/// Latin scripts read columns left to right; right-to-left scripts reverse
/// the column pass while keeping each column top-to-bottom.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnDirection {
    #[default]
    LeftToRight,
    RightToLeft,
}

/// Tuning knobs of the reading-order engine.
///
/// All distances are page pixels at the rasterisation resolution (the
/// defaults assume the pipeline's 150 DPI). Validated once, at
/// [`ReadingOrderEngine::new`]; a bad value there is a setup bug and fails
/// fast rather than skewing every page.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderConfig {
    /// Minimum horizontal whitespace that counts as a column boundary.
    /// Default: 24.0 (about 12 pt at 150 DPI).
    pub min_gap_width: f32,

    /// Maximum vertical gap between a figure/table and the caption below it
    /// for the two to be glued together. Default: 32.0.
    pub caption_distance_threshold: f32,

    /// Column traversal order. Default: left to right.
    pub column_direction: ColumnDirection,

    /// Fraction of the page width above which a region spans all columns.
    /// Default: 0.85.
    pub full_width_ratio: f32,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            min_gap_width: 24.0,
            caption_distance_threshold: 32.0,
            column_direction: ColumnDirection::default(),
            full_width_ratio: 0.85,
        }
    }
}

impl OrderConfig {
    pub(crate) fn validate(&self) -> Result<(), FoliomdError> {
        if !(self.min_gap_width > 0.0) || !self.min_gap_width.is_finite() {
            return Err(FoliomdError::InvalidConfig(format!(
                "min_gap_width must be a positive number of pixels, got {}",
                self.min_gap_width
            )));
        }
        if !(self.caption_distance_threshold >= 0.0)
            || !self.caption_distance_threshold.is_finite()
        {
            return Err(FoliomdError::InvalidConfig(format!(
                "caption_distance_threshold must be zero or a positive number of pixels, got {}",
                self.caption_distance_threshold
            )));
        }
        if !(self.full_width_ratio > 0.0 && self.full_width_ratio <= 1.0) {
            return Err(FoliomdError::InvalidConfig(format!(
                "full_width_ratio must be within (0, 1], got {}",
                self.full_width_ratio
            )));
        }
        Ok(())
    }
}

/// A region excluded from ordering, with the reason.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RejectedRegion {
    pub id: u32,
    pub reason: RejectReason,
}

/// The reconstructed order for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadingOrder {
    /// Region ids in reading order. Position = reading rank.
    pub ranked: Vec<u32>,
    /// Malformed regions dropped before ordering.
    pub rejected: Vec<RejectedRegion>,
    /// Number of precedence edges dropped to break cycles. Zero on a clean
    /// page; non-zero means the layout contradicted itself and the order is
    /// best-effort.
    pub dropped_edges: usize,
}

impl ReadingOrder {
    /// Reading rank of a region id, if it was ranked.
    pub fn rank_of(&self, id: u32) -> Option<usize> {
        self.ranked.iter().position(|&r| r == id)
    }
}

/// The reading-order reconstruction engine. Cheap to construct, cheap to
/// share (`Copy`-sized config inside), safe to call from any number of
/// threads at once.
#[derive(Debug, Clone)]
pub struct ReadingOrderEngine {
    config: OrderConfig,
}

impl ReadingOrderEngine {
    /// Validate `config` and build an engine. The only fatal error in the
    /// engine's lifecycle; everything later degrades per region or per page.
    pub fn new(config: OrderConfig) -> Result<Self, FoliomdError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Engine with the default configuration. Infallible because the
    /// defaults always validate.
    pub fn with_defaults() -> Self {
        Self {
            config: OrderConfig::default(),
        }
    }

    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    /// Reconstruct the reading order of one page.
    ///
    /// Malformed regions (empty or non-finite bounds, coordinates outside
    /// `page`) are excluded and reported in [`ReadingOrder::rejected`];
    /// everything else is ranked. Duplicate ids are a caller contract
    /// violation: the result is unspecified but the call will not panic.
    pub fn reconstruct(&self, regions: &[Region], page: PageExtent) -> ReadingOrder {
        let mut valid: Vec<Region> = Vec::with_capacity(regions.len());
        let mut rejected: Vec<RejectedRegion> = Vec::new();
        for r in regions {
            match region::check(r, page) {
                Ok(()) => valid.push(*r),
                Err(reason) => {
                    warn!("rejecting region {}: {}", r.id, reason);
                    rejected.push(RejectedRegion { id: r.id, reason });
                }
            }
        }

        if valid.len() <= 1 {
            return ReadingOrder {
                ranked: valid.iter().map(|r| r.id).collect(),
                rejected,
                dropped_edges: 0,
            };
        }

        let seg = columns::segment(&valid, &self.config, page);
        let graph = graph::build(&valid, &seg, &self.config);
        let out = sequence::sequence(&graph);
        debug!(
            "ranked {} regions across {} columns ({} full-width, {} edges, {} dropped)",
            valid.len(),
            seg.columns.len(),
            seg.full_width.len(),
            graph.edges.len(),
            out.dropped.len()
        );

        ReadingOrder {
            ranked: out.order.iter().map(|&i| valid[i].id).collect(),
            rejected,
            dropped_edges: out.dropped.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: PageExtent = PageExtent {
        width: 800.0,
        height: 1000.0,
    };

    fn engine() -> ReadingOrderEngine {
        ReadingOrderEngine::with_defaults()
    }

    fn region(id: u32, bbox: [f32; 4], kind: RegionKind) -> Region {
        Region::new(id, bbox.into(), kind)
    }

    #[test]
    fn negative_gap_width_fails_construction() {
        let config = OrderConfig {
            min_gap_width: -1.0,
            ..OrderConfig::default()
        };
        assert!(matches!(
            ReadingOrderEngine::new(config),
            Err(FoliomdError::InvalidConfig(_))
        ));
    }

    #[test]
    fn nan_threshold_fails_construction() {
        let config = OrderConfig {
            caption_distance_threshold: f32::NAN,
            ..OrderConfig::default()
        };
        assert!(ReadingOrderEngine::new(config).is_err());
    }

    #[test]
    fn ratio_above_one_fails_construction() {
        let config = OrderConfig {
            full_width_ratio: 1.5,
            ..OrderConfig::default()
        };
        assert!(ReadingOrderEngine::new(config).is_err());
    }

    #[test]
    fn empty_page_returns_empty_order() {
        let order = engine().reconstruct(&[], PAGE);
        assert!(order.ranked.is_empty());
        assert!(order.rejected.is_empty());
        assert_eq!(order.dropped_edges, 0);
    }

    #[test]
    fn single_region_is_trivially_ranked() {
        let regions = vec![region(7, [10.0, 10.0, 200.0, 50.0], RegionKind::Text)];
        let order = engine().reconstruct(&regions, PAGE);
        assert_eq!(order.ranked, vec![7]);
    }

    #[test]
    fn malformed_regions_are_reported_not_ranked() {
        let regions = vec![
            region(0, [10.0, 10.0, 200.0, 50.0], RegionKind::Text),
            region(1, [10.0, 60.0, 10.0, 100.0], RegionKind::Text),
            region(2, [700.0, 10.0, 900.0, 50.0], RegionKind::Text),
            region(3, [10.0, 120.0, 200.0, 160.0], RegionKind::Text),
        ];
        let order = engine().reconstruct(&regions, PAGE);
        assert_eq!(order.ranked, vec![0, 3]);
        assert_eq!(order.rejected.len(), 2);
        assert_eq!(order.rejected[0].id, 1);
        assert_eq!(order.rejected[0].reason, RejectReason::EmptyBounds);
        assert_eq!(order.rejected[1].id, 2);
        assert_eq!(order.rejected[1].reason, RejectReason::OutOfPage);
    }

    #[test]
    fn single_column_follows_y_order() {
        let regions = vec![
            region(0, [10.0, 300.0, 300.0, 400.0], RegionKind::Text),
            region(1, [10.0, 10.0, 300.0, 100.0], RegionKind::Title),
            region(2, [10.0, 150.0, 300.0, 250.0], RegionKind::Text),
        ];
        let order = engine().reconstruct(&regions, PAGE);
        assert_eq!(order.ranked, vec![1, 2, 0]);
    }

    #[test]
    fn duplicate_ids_do_not_panic() {
        let regions = vec![
            region(5, [10.0, 10.0, 300.0, 100.0], RegionKind::Text),
            region(5, [10.0, 150.0, 300.0, 250.0], RegionKind::Text),
        ];
        let order = engine().reconstruct(&regions, PAGE);
        assert_eq!(order.ranked.len(), 2);
    }

    #[test]
    fn rank_of_finds_position() {
        let regions = vec![
            region(3, [10.0, 10.0, 300.0, 100.0], RegionKind::Text),
            region(8, [10.0, 150.0, 300.0, 250.0], RegionKind::Text),
        ];
        let order = engine().reconstruct(&regions, PAGE);
        assert_eq!(order.rank_of(3), Some(0));
        assert_eq!(order.rank_of(8), Some(1));
        assert_eq!(order.rank_of(99), None);
    }
}
