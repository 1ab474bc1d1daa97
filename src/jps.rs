//! Incremental jump point search.
//!
//! Corner cutting is never allowed, so the only forced neighbors come from cardinal scans: moving
//! along a wall that ends opens a side turn. Diagonal scans stop wherever one of their two
//! cardinal sub-scans finds something.
//!
//! Scanning is the expensive part, so scanned tiles are charged against the expansion budget and
//! a scan that walks [`SCAN_LIMIT`] tiles stops early, treating the tile it reached as a jump
//! point. The search carries on from there later, so large open maps cost several bounded steps
//! instead of one unbounded one.
use bevy::log;
use rustc_hash::FxHashSet;
use std::collections::BinaryHeap;

use crate::{
    astar::SearchStep,
    dir::Dir,
    graph::GraphStore,
    job::CancellationToken,
    node::NodeRef,
    path::Path,
    traversal::{
        direction_traversable, distance, reconstruct_jump_path, tile_cost, PathfindingArgs,
        TIE_BREAKER,
    },
    FxIndexMap, SmallestCostHolder,
};

/// Maximum tiles one scan walks, counting the cardinal sub-scans of a diagonal scan.
pub(crate) const SCAN_LIMIT: usize = 1000;

/// Scanned tiles that cost as much as one A* expansion, which looks at eight neighbors.
const TILES_PER_EXPANSION: usize = 8;

pub(crate) struct JumpPointSearch {
    end: NodeRef,
    open: BinaryHeap<SmallestCostHolder>,
    visited: FxIndexMap<NodeRef, (usize, f32)>,
    /// Jump points are closed as soon as they are discovered.
    closed: FxHashSet<NodeRef>,
    /// Tiles scanned over the whole search.
    scanned: usize,
}

impl JumpPointSearch {
    pub(crate) fn new(start: NodeRef, end: NodeRef) -> Self {
        let mut open = BinaryHeap::new();
        open.push(SmallestCostHolder {
            estimated_cost: 0.0,
            cost: 0.0,
            index: 0,
        });

        let mut visited: FxIndexMap<NodeRef, (usize, f32)> = FxIndexMap::default();
        visited.insert(start, (usize::MAX, 0.0));

        let mut closed = FxHashSet::default();
        closed.insert(start);

        JumpPointSearch {
            end,
            open,
            visited,
            closed,
            scanned: 0,
        }
    }

    pub(crate) fn step(
        &mut self,
        graph: &GraphStore,
        args: &PathfindingArgs,
        budget: usize,
        token: &CancellationToken,
    ) -> SearchStep {
        let goal = self.end.tile().pos;
        let mut spent = 0;

        while spent < budget {
            if token.is_cancelled() {
                return SearchStep::Cancelled;
            }

            let Some(SmallestCostHolder { index, .. }) = self.open.pop() else {
                return SearchStep::Exhausted;
            };

            let Some((&current, &(_, current_cost))) = self.visited.get_index(index) else {
                return SearchStep::Exhausted;
            };

            if current == self.end {
                let steps = reconstruct_jump_path(&self.visited, index);
                return SearchStep::Found(Path::new(steps, current_cost));
            }

            if graph.node(&current).is_none() {
                return SearchStep::GraphMissing;
            }

            let scanned_before = self.scanned;
            for &dir in args.directions() {
                let mut scan = 0;
                let jump_point = self.jump(graph, args, current, dir, &mut scan);
                self.scanned += scan;

                let Some(jump_point) = jump_point else {
                    continue;
                };

                if !self.closed.insert(jump_point) {
                    continue;
                }

                // Jumps run in a straight line, so the distance is the exact movement cost
                let from = current.tile().pos;
                let to = jump_point.tile().pos;
                let new_cost = current_cost + distance(args, from, to);

                let (n, _) = self.visited.insert_full(jump_point, (index, new_cost));
                let h = distance(args, to, goal) * TIE_BREAKER;
                self.open.push(SmallestCostHolder {
                    estimated_cost: new_cost + h,
                    cost: new_cost,
                    index: n,
                });
            }

            spent += ((self.scanned - scanned_before) / TILES_PER_EXPANSION).max(1);
        }

        SearchStep::Pending
    }

    /// Scans from `from` in `dir` until it reaches the goal, a jump point, or something it cannot
    /// enter. Every tile walked is counted in `scan`; once it reaches [`SCAN_LIMIT`] the tile
    /// reached is returned as a jump point.
    fn jump(
        &self,
        graph: &GraphStore,
        args: &PathfindingArgs,
        from: NodeRef,
        dir: Dir,
        scan: &mut usize,
    ) -> Option<NodeRef> {
        let mut current = from;

        loop {
            let next = advance(graph, args, current, dir)?;
            *scan += 1;

            if next == self.end {
                return Some(next);
            }

            match dir.flanks() {
                Some((a, b)) => {
                    if self.jump(graph, args, next, a, scan).is_some()
                        || self.jump(graph, args, next, b, scan).is_some()
                    {
                        return Some(next);
                    }
                }
                None => {
                    if has_forced_neighbor(graph, args, current, next, dir) {
                        return Some(next);
                    }
                }
            }

            if *scan >= SCAN_LIMIT {
                log::trace!(
                    "Jump scan from {} towards {:?} stopped at {} after {} tiles",
                    from.tile(),
                    dir,
                    next.tile(),
                    SCAN_LIMIT
                );
                return Some(next);
            }

            current = next;
        }
    }
}

/// The neighbor in `dir`, if a search may step onto it.
fn advance(graph: &GraphStore, args: &PathfindingArgs, from: NodeRef, dir: Dir) -> Option<NodeRef> {
    let next = graph.get_neighbor(from, dir)?;
    if !direction_traversable(graph, args, from, dir) {
        return None;
    }

    tile_cost(args, graph.node(&from)?, graph.node(&next)?)?;
    Some(next)
}

/// A side of `next` is open while the same side of `previous` was not.
fn has_forced_neighbor(
    graph: &GraphStore,
    args: &PathfindingArgs,
    previous: NodeRef,
    next: NodeRef,
    dir: Dir,
) -> bool {
    let (a, b) = dir.perpendicular();
    [a, b].into_iter().any(|side| {
        advance(graph, args, next, side).is_some() && advance(graph, args, previous, side).is_none()
    })
}
