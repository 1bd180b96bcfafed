//! Reading-order engine integration tests.
//!
//! Every test drives the public API only: build regions the way a detector
//! would emit them (arbitrary order, pixel coordinates), reconstruct, and
//! check the ranked ids against the order a human reader would follow.
//! Page geometry is 800x1000 px throughout, so the default full-width cut
//! is 680 px and the column gutter sits around x=400.

use foliomd::{
    ColumnDirection, FoliomdError, OrderConfig, PageExtent, ReadingOrderEngine, Region,
    RegionKind, RejectReason, RejectedRegion,
};

const PAGE: PageExtent = PageExtent {
    width: 800.0,
    height: 1000.0,
};

fn region(id: u32, bbox: [f32; 4], kind: RegionKind) -> Region {
    Region::new(id, bbox.into(), kind)
}

fn engine() -> ReadingOrderEngine {
    ReadingOrderEngine::with_defaults()
}

// ── Columns ──────────────────────────────────────────────────────────────────

/// A full-width title banner is read before either column body.
#[test]
fn title_banner_reads_before_both_columns() {
    let regions = vec![
        region(0, [40.0, 20.0, 760.0, 70.0], RegionKind::Title),
        region(1, [50.0, 100.0, 380.0, 500.0], RegionKind::Text),
        region(2, [50.0, 520.0, 380.0, 900.0], RegionKind::Text),
        region(3, [420.0, 100.0, 750.0, 500.0], RegionKind::Text),
        region(4, [420.0, 520.0, 750.0, 900.0], RegionKind::Text),
    ];
    let order = engine().reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![0, 1, 2, 3, 4]);
    assert!(order.rejected.is_empty());
    assert_eq!(order.dropped_edges, 0);
}

/// The whole left column is read before the right column starts, regardless
/// of the ids (and therefore the order) the detector assigned.
#[test]
fn left_column_is_exhausted_before_the_right() {
    let regions = vec![
        region(0, [420.0, 100.0, 750.0, 300.0], RegionKind::Text),
        region(1, [50.0, 100.0, 380.0, 300.0], RegionKind::Text),
        region(2, [420.0, 320.0, 750.0, 600.0], RegionKind::Text),
        region(3, [50.0, 320.0, 380.0, 600.0], RegionKind::Text),
    ];
    let order = engine().reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![1, 3, 0, 2]);
}

/// Right-to-left direction reverses the column pass, not the order inside
/// a column.
#[test]
fn right_to_left_reads_right_column_first() {
    let regions = vec![
        region(0, [420.0, 100.0, 750.0, 300.0], RegionKind::Text),
        region(1, [50.0, 100.0, 380.0, 300.0], RegionKind::Text),
        region(2, [420.0, 320.0, 750.0, 600.0], RegionKind::Text),
        region(3, [50.0, 320.0, 380.0, 600.0], RegionKind::Text),
    ];
    let rtl = ReadingOrderEngine::new(OrderConfig {
        column_direction: ColumnDirection::RightToLeft,
        ..OrderConfig::default()
    })
    .unwrap();
    let order = rtl.reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![0, 2, 1, 3]);
}

/// Interleaved y positions across two columns: the column pass, not the
/// page-global y order, decides the sequence.
#[test]
fn interleaved_columns_drain_one_at_a_time() {
    let regions = vec![
        region(0, [0.0, 10.0, 400.0, 40.0], RegionKind::Text),
        region(1, [0.0, 50.0, 400.0, 80.0], RegionKind::Text),
        region(2, [0.0, 90.0, 400.0, 120.0], RegionKind::Text),
        region(3, [420.0, 20.0, 800.0, 45.0], RegionKind::Text),
        region(4, [420.0, 60.0, 800.0, 85.0], RegionKind::Text),
    ];
    // The gutter here is only 20 px, so the boundary threshold must sit
    // below it for the columns to split at all.
    let narrow = |direction| {
        ReadingOrderEngine::new(OrderConfig {
            min_gap_width: 16.0,
            column_direction: direction,
            ..OrderConfig::default()
        })
        .unwrap()
    };

    let ltr = narrow(ColumnDirection::LeftToRight).reconstruct(&regions, PAGE);
    assert_eq!(ltr.ranked, vec![0, 1, 2, 3, 4]);

    let rtl = narrow(ColumnDirection::RightToLeft).reconstruct(&regions, PAGE);
    assert_eq!(rtl.ranked, vec![3, 4, 0, 1, 2]);
}

/// A narrower `min_gap_width` finds the gutter; a wider one dissolves the
/// columns into a single top-to-bottom flow.
#[test]
fn min_gap_width_decides_whether_a_gutter_splits_columns() {
    // 30 px of whitespace between x=385 and x=415.
    let regions = vec![
        region(0, [50.0, 100.0, 385.0, 300.0], RegionKind::Text),
        region(1, [415.0, 100.0, 750.0, 300.0], RegionKind::Text),
        region(2, [50.0, 320.0, 385.0, 600.0], RegionKind::Text),
        region(3, [415.0, 320.0, 750.0, 600.0], RegionKind::Text),
    ];

    // Default threshold (24 px): the gutter qualifies, columns split.
    let columns = engine().reconstruct(&regions, PAGE);
    assert_eq!(columns.ranked, vec![0, 2, 1, 3]);

    // 40 px threshold: the same gutter is too narrow, one column remains
    // and rows interleave top-to-bottom, left before right on equal y.
    let merged = ReadingOrderEngine::new(OrderConfig {
        min_gap_width: 40.0,
        ..OrderConfig::default()
    })
    .unwrap();
    let flat = merged.reconstruct(&regions, PAGE);
    assert_eq!(flat.ranked, vec![0, 1, 2, 3]);
}

// ── Full-width interrupts ────────────────────────────────────────────────────

/// A page-spanning band is a synchronization point: both columns drain
/// above it, then both resume below it.
#[test]
fn full_width_band_interrupts_both_columns() {
    let regions = vec![
        region(0, [50.0, 100.0, 380.0, 400.0], RegionKind::Text),
        region(1, [420.0, 100.0, 750.0, 400.0], RegionKind::Text),
        region(2, [40.0, 450.0, 760.0, 550.0], RegionKind::Figure),
        region(3, [50.0, 600.0, 380.0, 900.0], RegionKind::Text),
        region(4, [420.0, 600.0, 750.0, 900.0], RegionKind::Text),
    ];
    let order = engine().reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![0, 1, 2, 3, 4]);
    assert_eq!(order.dropped_edges, 0);
}

// ── Captions ─────────────────────────────────────────────────────────────────

/// A caption within the distance threshold follows its figure immediately,
/// even when a region in another column starts higher up the page.
#[test]
fn caption_is_glued_directly_after_its_figure() {
    let regions = vec![
        region(0, [50.0, 100.0, 380.0, 300.0], RegionKind::Text),
        region(1, [420.0, 100.0, 750.0, 300.0], RegionKind::Text),
        region(2, [40.0, 350.0, 760.0, 600.0], RegionKind::Figure),
        // 10 px under the figure, inside the right column's x-span.
        region(3, [420.0, 610.0, 700.0, 650.0], RegionKind::Caption),
        // Starts higher than the caption; without the glue it would win.
        region(4, [50.0, 605.0, 380.0, 900.0], RegionKind::Text),
        region(5, [420.0, 700.0, 750.0, 900.0], RegionKind::Text),
    ];
    let order = engine().reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(
        order.rank_of(3),
        order.rank_of(2).map(|r| r + 1),
        "caption must hold the rank right after its figure"
    );
}

/// Beyond the distance threshold the caption is ordinary flow content and
/// ranks by its own column position.
#[test]
fn distant_caption_stays_in_column_flow() {
    let regions = vec![
        region(0, [50.0, 100.0, 380.0, 300.0], RegionKind::Text),
        region(1, [420.0, 100.0, 750.0, 300.0], RegionKind::Text),
        region(2, [40.0, 350.0, 760.0, 600.0], RegionKind::Figure),
        // 110 px below the figure: past the default 32 px threshold.
        region(3, [420.0, 710.0, 700.0, 750.0], RegionKind::Caption),
        region(4, [50.0, 605.0, 380.0, 900.0], RegionKind::Text),
        region(5, [420.0, 780.0, 750.0, 900.0], RegionKind::Text),
    ];
    let order = engine().reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![0, 1, 2, 4, 3, 5]);
}

// ── Rejection and degenerate input ───────────────────────────────────────────

/// Malformed regions are reported with a reason, never ranked, and never
/// poison their siblings.
#[test]
fn malformed_regions_are_reported_not_ranked() {
    let regions = vec![
        region(0, [50.0, 100.0, 380.0, 300.0], RegionKind::Text),
        // Inverted box.
        region(1, [300.0, 100.0, 100.0, 300.0], RegionKind::Text),
        // Reaches past the right page edge.
        region(2, [600.0, 100.0, 900.0, 300.0], RegionKind::Text),
        region(3, [50.0, 320.0, 380.0, 600.0], RegionKind::Text),
    ];
    let order = engine().reconstruct(&regions, PAGE);

    assert_eq!(order.ranked, vec![0, 3]);
    assert_eq!(
        order.rejected,
        vec![
            RejectedRegion {
                id: 1,
                reason: RejectReason::EmptyBounds,
            },
            RejectedRegion {
                id: 2,
                reason: RejectReason::OutOfPage,
            },
        ]
    );
}

#[test]
fn empty_page_yields_empty_order() {
    let order = engine().reconstruct(&[], PAGE);
    assert!(order.ranked.is_empty());
    assert!(order.rejected.is_empty());
    assert_eq!(order.dropped_edges, 0);
}

#[test]
fn single_region_is_ranked_alone() {
    let regions = vec![region(7, [50.0, 100.0, 380.0, 300.0], RegionKind::Text)];
    let order = engine().reconstruct(&regions, PAGE);
    assert_eq!(order.ranked, vec![7]);
}

/// Headers and footers are ranked like any region; dropping page furniture
/// is a rendering decision, not an ordering one.
#[test]
fn page_furniture_is_ranked_in_place() {
    let regions = vec![
        region(0, [50.0, 10.0, 750.0, 40.0], RegionKind::Header),
        region(1, [50.0, 100.0, 380.0, 900.0], RegionKind::Text),
        region(2, [420.0, 100.0, 750.0, 900.0], RegionKind::Text),
        region(3, [50.0, 950.0, 750.0, 990.0], RegionKind::Footer),
    ];
    let order = engine().reconstruct(&regions, PAGE);
    assert_eq!(order.ranked, vec![0, 1, 2, 3]);
}

// ── Determinism ──────────────────────────────────────────────────────────────

/// The ranking is a function of geometry and ids, not of slice order: any
/// permutation of the same regions yields the identical ranking.
#[test]
fn slice_order_does_not_leak_into_the_ranking() {
    let regions = vec![
        region(0, [40.0, 20.0, 760.0, 70.0], RegionKind::Title),
        region(1, [50.0, 100.0, 380.0, 500.0], RegionKind::Text),
        region(2, [50.0, 520.0, 380.0, 900.0], RegionKind::Text),
        region(3, [420.0, 100.0, 750.0, 460.0], RegionKind::Figure),
        region(4, [420.0, 470.0, 750.0, 500.0], RegionKind::Caption),
        region(5, [420.0, 520.0, 750.0, 900.0], RegionKind::Text),
    ];
    let eng = engine();
    let baseline = eng.reconstruct(&regions, PAGE).ranked;

    let permutations: [[usize; 6]; 3] = [
        [5, 4, 3, 2, 1, 0],
        [2, 0, 4, 1, 5, 3],
        [3, 5, 1, 4, 0, 2],
    ];
    for perm in permutations {
        let shuffled: Vec<Region> = perm.iter().map(|&i| regions[i]).collect();
        assert_eq!(
            eng.reconstruct(&shuffled, PAGE).ranked,
            baseline,
            "permutation {perm:?} changed the ranking"
        );
    }
}

/// Two identical calls return identical results, including rejects.
#[test]
fn reconstruction_is_repeatable() {
    let regions = vec![
        region(0, [50.0, 100.0, 380.0, 500.0], RegionKind::Text),
        region(1, [420.0, 100.0, 750.0, 500.0], RegionKind::Text),
        region(2, [f32::NAN, 0.0, 10.0, 10.0], RegionKind::Text),
    ];
    let eng = engine();
    let a = eng.reconstruct(&regions, PAGE);
    let b = eng.reconstruct(&regions, PAGE);
    assert_eq!(a.ranked, b.ranked);
    assert_eq!(a.rejected, b.rejected);
    assert_eq!(a.dropped_edges, b.dropped_edges);
}

// ── Configuration validation ─────────────────────────────────────────────────

#[test]
fn engine_construction_rejects_bad_knobs() {
    for config in [
        OrderConfig {
            min_gap_width: 0.0,
            ..OrderConfig::default()
        },
        OrderConfig {
            min_gap_width: f32::NAN,
            ..OrderConfig::default()
        },
        OrderConfig {
            caption_distance_threshold: -1.0,
            ..OrderConfig::default()
        },
        OrderConfig {
            full_width_ratio: 0.0,
            ..OrderConfig::default()
        },
        OrderConfig {
            full_width_ratio: 1.2,
            ..OrderConfig::default()
        },
    ] {
        assert!(
            matches!(
                ReadingOrderEngine::new(config),
                Err(FoliomdError::InvalidConfig(_))
            ),
            "config {config:?} should fail validation"
        );
    }
}
