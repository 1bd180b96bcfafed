//! Precedence graph construction: "read a before b" edges over one page.
//!
//! Three edge families, in descending drop priority for cycle breaking:
//!
//! * `Column` — consecutive members of one column, top to bottom. The
//!   backbone of the order; never dropped while an alternative exists.
//! * `Caption` — a caption glued to the figure/table it annotates. Replaces
//!   the column edge for that pair when the two are column-adjacent.
//! * `FullWidth` — synchronization through a page-spanning region: whatever
//!   sits strictly above it on the page is read first, whatever sits
//!   strictly below is read after, in every column at once.
//!
//! Cross-column order carries no edges at all. Among simultaneously ready
//! nodes the sequencer's sort key prefers the lower column index, which
//! yields one full pass per column before the next; edges only encode
//! constraints that must hold regardless of column traversal.

use std::collections::{BTreeMap, BTreeSet};

use super::columns::Segmentation;
use super::region::{Region, RegionKind};
use super::sequence::SortKey;
use super::{ColumnDirection, OrderConfig};

/// Edge families, ordered so that the derived `Ord` ranks the first victim
/// for cycle breaking last: `Column < Caption < FullWidth` means full-width
/// synchronization edges are dropped first and column edges survive longest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(super) enum EdgeKind {
    Column,
    Caption,
    FullWidth,
}

impl EdgeKind {
    pub(super) fn label(&self) -> &'static str {
        match self {
            EdgeKind::Column => "column",
            EdgeKind::Caption => "caption",
            EdgeKind::FullWidth => "full-width",
        }
    }
}

/// One precedence constraint between two region indices.
#[derive(Debug, Clone, Copy)]
pub(super) struct Edge {
    pub src: usize,
    pub dst: usize,
    pub kind: EdgeKind,
}

/// The per-page precedence graph plus the sequencing key of every node.
#[derive(Debug)]
pub(super) struct OrderGraph {
    pub keys: Vec<SortKey>,
    pub edges: Vec<Edge>,
}

/// How a region participates in graph construction. Exhaustive over
/// [`RegionKind`] so a new layout type forces a decision here.
enum OrderRole {
    /// Can own a caption: figures and tables.
    Anchor,
    /// Seeks an anchor to follow.
    Caption,
    /// Ordinary flow content.
    Flow,
}

fn order_role(kind: RegionKind) -> OrderRole {
    match kind {
        RegionKind::Figure | RegionKind::Table => OrderRole::Anchor,
        RegionKind::Caption => OrderRole::Caption,
        RegionKind::Title
        | RegionKind::Text
        | RegionKind::Footer
        | RegionKind::Header
        | RegionKind::Formula
        | RegionKind::List => OrderRole::Flow,
    }
}

/// Build the precedence graph for one page.
pub(super) fn build(regions: &[Region], seg: &Segmentation, config: &OrderConfig) -> OrderGraph {
    let n = regions.len();

    // ── Sequencing keys ───────────────────────────────────────────────────
    // Full-width regions take column 0 so a page-spanning band is read at
    // the top of the band it opens; real columns are numbered from 1 in
    // traversal order.
    let mut keys: Vec<SortKey> = regions
        .iter()
        .map(|r| SortKey {
            column: 0,
            y: r.bbox.y_min,
            x: r.bbox.x_min,
            glue: 0,
            id: r.id,
        })
        .collect();

    let traversal: Vec<usize> = match config.column_direction {
        ColumnDirection::LeftToRight => (0..seg.columns.len()).collect(),
        ColumnDirection::RightToLeft => (0..seg.columns.len()).rev().collect(),
    };
    for (pos, &col) in traversal.iter().enumerate() {
        for &m in &seg.columns[col].members {
            keys[m].column = (pos + 1) as u32;
        }
    }

    // ── Caption association ───────────────────────────────────────────────
    // Each caption seeks the nearest anchor strictly above it within the
    // configured gap, requiring horizontal overlap; ties go to the leftmost
    // anchor, then the lowest id. BTreeMap keeps grouping deterministic.
    let mut anchored: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (c, cap) in regions.iter().enumerate() {
        if !matches!(order_role(cap.kind), OrderRole::Caption) {
            continue;
        }
        let mut best: Option<(f32, f32, u32, usize)> = None;
        for (f, fig) in regions.iter().enumerate() {
            if !matches!(order_role(fig.kind), OrderRole::Anchor) {
                continue;
            }
            let gap = cap.bbox.y_min - fig.bbox.y_max;
            if !(0.0..=config.caption_distance_threshold).contains(&gap) {
                continue;
            }
            if cap.bbox.h_overlap(&fig.bbox) <= 0.0 {
                continue;
            }
            let candidate = (gap, fig.bbox.x_min, fig.id, f);
            let better = match &best {
                None => true,
                Some(cur) => {
                    candidate
                        .0
                        .total_cmp(&cur.0)
                        .then(candidate.1.total_cmp(&cur.1))
                        .then(candidate.2.cmp(&cur.2))
                        .is_lt()
                }
            };
            if better {
                best = Some(candidate);
            }
        }
        if let Some((_, _, _, f)) = best {
            anchored.entry(f).or_default().push(c);
        }
    }

    let mut edges: Vec<Edge> = Vec::new();
    let mut glued: BTreeSet<(usize, usize)> = BTreeSet::new();
    for (&f, caps) in &mut anchored {
        caps.sort_by(|&a, &b| {
            let (ra, rb) = (&regions[a], &regions[b]);
            ra.bbox
                .y_min
                .total_cmp(&rb.bbox.y_min)
                .then(ra.bbox.x_min.total_cmp(&rb.bbox.x_min))
                .then(ra.id.cmp(&rb.id))
        });
        for (i, &c) in caps.iter().enumerate() {
            // The caption adopts its anchor's key plus a glue ordinal, which
            // makes it the immediate heap successor of the anchor: nothing
            // can sort strictly between them once the anchor is emitted.
            keys[c] = SortKey {
                glue: (i + 1) as u16,
                id: regions[c].id,
                ..keys[f]
            };
            edges.push(Edge {
                src: f,
                dst: c,
                kind: EdgeKind::Caption,
            });
            glued.insert((f, c));
        }
    }

    // ── Column chains ─────────────────────────────────────────────────────
    for col in &seg.columns {
        for w in col.members.windows(2) {
            let kind = if glued.contains(&(w[0], w[1])) {
                // The association already covers this pair; keeping it at
                // caption priority lets a conflicting layout drop it.
                EdgeKind::Caption
            } else {
                EdgeKind::Column
            };
            edges.push(Edge {
                src: w[0],
                dst: w[1],
                kind,
            });
        }
    }

    // ── Full-width synchronization ────────────────────────────────────────
    for &f in &seg.full_width {
        let band = &regions[f].bbox;
        for r in 0..n {
            if r == f {
                continue;
            }
            let other = &regions[r].bbox;
            if other.y_max <= band.y_min {
                edges.push(Edge {
                    src: r,
                    dst: f,
                    kind: EdgeKind::FullWidth,
                });
            } else if other.y_min >= band.y_max {
                edges.push(Edge {
                    src: f,
                    dst: r,
                    kind: EdgeKind::FullWidth,
                });
            }
        }
    }

    // ── Deduplication ─────────────────────────────────────────────────────
    // Parallel (src, dst) duplicates collapse onto the hardest-to-drop kind,
    // e.g. a caption hanging under a full-width figure keeps the caption
    // edge, not the redundant synchronization copy.
    let mut unique: BTreeMap<(usize, usize), EdgeKind> = BTreeMap::new();
    for e in edges {
        unique
            .entry((e.src, e.dst))
            .and_modify(|k| {
                if e.kind < *k {
                    *k = e.kind;
                }
            })
            .or_insert(e.kind);
    }
    let edges = unique
        .into_iter()
        .map(|((src, dst), kind)| Edge { src, dst, kind })
        .collect();

    OrderGraph { keys, edges }
}
