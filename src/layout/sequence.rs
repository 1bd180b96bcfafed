//! Deterministic linearization of the precedence graph.
//!
//! Kahn's algorithm with a priority heap: among nodes whose predecessors are
//! all emitted, the smallest `(column, y, x, glue, id)` key goes next. The
//! key makes the order a pure function of the input geometry; neither
//! detector output order nor hash iteration order can leak in.
//!
//! A cycle (possible when a caption association or full-width override
//! contradicts the column chains) stalls Kahn with nodes left over. One
//! cycle is then located by walking predecessors from the smallest-key
//! leftover node, its lowest-priority edge is dropped, and sequencing
//! restarts. Pages are small, so the restart costs nothing measurable and
//! keeps the resolution obviously deterministic.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use tracing::warn;

use super::graph::{Edge, OrderGraph};

/// Lexicographic sequencing key. `column` 0 is reserved for full-width
/// regions; real columns count from 1 in traversal order. `glue` orders an
/// associated caption directly behind its anchor.
#[derive(Debug, Clone, Copy)]
pub(super) struct SortKey {
    pub column: u32,
    pub y: f32,
    pub x: f32,
    pub glue: u16,
    pub id: u32,
}

impl SortKey {
    fn lex_cmp(&self, other: &Self) -> Ordering {
        self.column
            .cmp(&other.column)
            .then_with(|| self.y.total_cmp(&other.y))
            .then_with(|| self.x.total_cmp(&other.x))
            .then_with(|| self.glue.cmp(&other.glue))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.lex_cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.lex_cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lex_cmp(other)
    }
}

/// Sequencing result: the emission order (indices into the region slice)
/// plus every edge dropped to break a cycle.
#[derive(Debug)]
pub(super) struct Sequenced {
    pub order: Vec<usize>,
    pub dropped: Vec<Edge>,
}

/// Linearize the graph into a total order.
pub(super) fn sequence(graph: &OrderGraph) -> Sequenced {
    let mut alive = vec![true; graph.edges.len()];
    let mut dropped = Vec::new();

    loop {
        match kahn(graph, &alive) {
            Ok(order) => return Sequenced { order, dropped },
            Err(emitted) => {
                let ei = pick_break_edge(graph, &alive, &emitted);
                let e = graph.edges[ei];
                warn!(
                    "cycle in precedence graph: dropping {} edge {} -> {}",
                    e.kind.label(),
                    graph.keys[e.src].id,
                    graph.keys[e.dst].id
                );
                alive[ei] = false;
                dropped.push(e);
            }
        }
    }
}

/// One Kahn pass over the alive edges. `Ok` carries the complete order;
/// `Err` carries the emitted-flags at the stall so the caller can find a
/// cycle among the leftovers.
fn kahn(graph: &OrderGraph, alive: &[bool]) -> Result<Vec<usize>, Vec<bool>> {
    let n = graph.keys.len();
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree = vec![0usize; n];
    for (ei, e) in graph.edges.iter().enumerate() {
        if alive[ei] {
            adj[e.src].push(ei);
            indegree[e.dst] += 1;
        }
    }

    let mut ready = BinaryHeap::new();
    for v in 0..n {
        if indegree[v] == 0 {
            ready.push(Reverse((graph.keys[v], v)));
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut emitted = vec![false; n];
    while let Some(Reverse((_, v))) = ready.pop() {
        order.push(v);
        emitted[v] = true;
        for &ei in &adj[v] {
            let d = graph.edges[ei].dst;
            indegree[d] -= 1;
            if indegree[d] == 0 {
                ready.push(Reverse((graph.keys[d], d)));
            }
        }
    }

    if order.len() == n {
        Ok(order)
    } else {
        Err(emitted)
    }
}

/// Locate one cycle among the unemitted nodes and pick its victim edge.
///
/// Every unemitted node still has an alive predecessor among the unemitted
/// (that is exactly why Kahn stalled), so repeatedly stepping to the
/// smallest-key predecessor must revisit a node within n steps; the stack
/// slice from that node onward is a cycle. The victim is the cycle edge
/// easiest to drop: highest [`EdgeKind`] (full-width first, column last),
/// ties to the smallest source then destination key.
fn pick_break_edge(graph: &OrderGraph, alive: &[bool], emitted: &[bool]) -> usize {
    let n = graph.keys.len();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (ei, e) in graph.edges.iter().enumerate() {
        if alive[ei] && !emitted[e.src] && !emitted[e.dst] {
            preds[e.dst].push(ei);
        }
    }

    let start = (0..n)
        .filter(|&v| !emitted[v])
        .min_by(|&a, &b| graph.keys[a].cmp(&graph.keys[b]))
        .unwrap_or(0);

    let mut stack = vec![start];
    let mut step_edges: Vec<usize> = Vec::new();
    let mut pos: Vec<Option<usize>> = vec![None; n];
    pos[start] = Some(0);

    let (cycle_start, closing_edge) = loop {
        let v = *stack.last().unwrap_or(&start);
        let ei = preds[v]
            .iter()
            .copied()
            .min_by(|&a, &b| {
                graph.keys[graph.edges[a].src].cmp(&graph.keys[graph.edges[b].src])
            })
            .unwrap_or_else(|| {
                // Unreachable per the stall invariant; degrade to dropping
                // the first alive edge rather than looping forever.
                alive.iter().position(|&a| a).unwrap_or(0)
            });
        let p = graph.edges[ei].src;
        if let Some(at) = pos[p] {
            break (at, ei);
        }
        pos[p] = Some(stack.len());
        stack.push(p);
        step_edges.push(ei);
    };

    let mut cycle: Vec<usize> = step_edges[cycle_start..].to_vec();
    cycle.push(closing_edge);

    cycle
        .into_iter()
        .max_by(|&a, &b| {
            let (ea, eb) = (&graph.edges[a], &graph.edges[b]);
            ea.kind
                .cmp(&eb.kind)
                .then_with(|| graph.keys[eb.src].cmp(&graph.keys[ea.src]))
                .then_with(|| graph.keys[eb.dst].cmp(&graph.keys[ea.dst]))
        })
        .unwrap_or(closing_edge)
}
