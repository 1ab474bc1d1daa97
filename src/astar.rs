//! Incremental A* over the chunk graph.
use indexmap::map::Entry::{Occupied, Vacant};
use std::collections::BinaryHeap;

use crate::{
    graph::GraphStore,
    job::CancellationToken,
    node::NodeRef,
    path::Path,
    traversal::{
        direction_traversable, distance, reconstruct_path, tile_cost, PathfindingArgs, TIE_BREAKER,
    },
    FxIndexMap, SmallestCostHolder,
};

/// Result of advancing a search by one budget.
#[derive(Debug)]
pub(crate) enum SearchStep {
    /// Budget spent, open set not empty.
    Pending,
    Found(Path),
    /// Open set exhausted without reaching the goal.
    Exhausted,
    Cancelled,
    /// A node the search depends on no longer resolves, e.g. its grid was removed.
    GraphMissing,
}

/// A* search state kept between steps.
///
/// The open set is a binary heap with lazy deletion: improving a node pushes a new entry and the
/// stale one is skipped when popped. The search succeeds when the goal is popped, not when it is
/// first discovered.
pub(crate) struct AStarSearch {
    end: NodeRef,
    open: BinaryHeap<SmallestCostHolder>,
    /// Every discovered node, with the index of its parent and its best known cost.
    visited: FxIndexMap<NodeRef, (usize, f32)>,
}

impl AStarSearch {
    pub(crate) fn new(start: NodeRef, end: NodeRef) -> Self {
        let mut open = BinaryHeap::new();
        open.push(SmallestCostHolder {
            estimated_cost: 0.0,
            cost: 0.0,
            index: 0,
        });

        let mut visited: FxIndexMap<NodeRef, (usize, f32)> = FxIndexMap::default();
        visited.insert(start, (usize::MAX, 0.0));

        AStarSearch { end, open, visited }
    }

    /// Expands at most `budget` nodes.
    pub(crate) fn step(
        &mut self,
        graph: &GraphStore,
        args: &PathfindingArgs,
        budget: usize,
        token: &CancellationToken,
    ) -> SearchStep {
        let goal = self.end.tile().pos;

        for _ in 0..budget {
            if token.is_cancelled() {
                return SearchStep::Cancelled;
            }

            let Some(SmallestCostHolder { cost, index, .. }) = self.open.pop() else {
                return SearchStep::Exhausted;
            };

            let Some((&current, &(_, current_cost))) = self.visited.get_index(index) else {
                return SearchStep::Exhausted;
            };

            // A cheaper route to this node was queued after this entry
            if cost > current_cost {
                continue;
            }

            if current == self.end {
                let steps = reconstruct_path(&self.visited, index);
                return SearchStep::Found(Path::new(steps, current_cost));
            }

            let Some(current_node) = graph.node(&current) else {
                return SearchStep::GraphMissing;
            };

            for &dir in args.directions() {
                let Some(neighbor) = graph.get_neighbor(current, dir) else {
                    continue;
                };

                if !direction_traversable(graph, args, current, dir) {
                    continue;
                }

                let Some(step_cost) = graph
                    .node(&neighbor)
                    .and_then(|n| tile_cost(args, current_node, n))
                else {
                    continue;
                };

                let new_cost = current_cost + step_cost;
                let n = match self.visited.entry(neighbor) {
                    Vacant(e) => {
                        let n = e.index();
                        e.insert((index, new_cost));
                        n
                    }
                    Occupied(mut e) => {
                        if e.get().1 > new_cost {
                            let n = e.index();
                            e.insert((index, new_cost));
                            n
                        } else {
                            continue;
                        }
                    }
                };

                let h = distance(args, neighbor.tile().pos, goal) * TIE_BREAKER;
                self.open.push(SmallestCostHolder {
                    estimated_cost: new_cost + h,
                    cost: new_cost,
                    index: n,
                });
            }
        }

        SearchStep::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::Occupant, world::TileMap, GridId, TileRef};
    use bevy::{ecs::entity::Entity, math::IVec2};
    use std::collections::{BinaryHeap, HashMap};

    const GRID: GridId = GridId(0);

    fn tile(x: i32, y: i32) -> TileRef {
        TileRef::new(GRID, IVec2::new(x, y))
    }

    fn setup(max: IVec2) -> (GraphStore, TileMap) {
        let mut world = TileMap::new();
        world.add_grid(GRID, IVec2::ZERO, max);
        let mut graph = GraphStore::new();
        graph.add_grid(GRID);
        graph.populate(&world, GRID).unwrap();
        (graph, world)
    }

    fn block(graph: &mut GraphStore, world: &TileMap, at: TileRef) {
        let entity = Entity::from_raw((at.pos.x * 1000 + at.pos.y) as u32);
        graph
            .get_node_mut(world, at)
            .unwrap()
            .add_blocker(entity, Occupant::Blocker(1));
    }

    fn run(
        graph: &mut GraphStore,
        world: &TileMap,
        from: TileRef,
        to: TileRef,
        args: &PathfindingArgs,
    ) -> Option<Path> {
        let start = graph.get_node_ref(world, from).unwrap();
        let end = graph.get_node_ref(world, to).unwrap();
        let mut search = AStarSearch::new(start, end);
        let token = CancellationToken::new();

        loop {
            match search.step(graph, args, 16, &token) {
                SearchStep::Pending => continue,
                SearchStep::Found(path) => return Some(path),
                _ => return None,
            }
        }
    }

    /// Plain Dijkstra over the same step rules, used as a reference for optimal costs.
    fn reference_cost(
        graph: &mut GraphStore,
        world: &TileMap,
        from: TileRef,
        to: TileRef,
        args: &PathfindingArgs,
    ) -> Option<f32> {
        let start = graph.get_node_ref(world, from).unwrap();
        let end = graph.get_node_ref(world, to).unwrap();
        let graph = &*graph;

        let mut best: HashMap<NodeRef, f32> = HashMap::new();
        let mut heap = BinaryHeap::new();
        let mut nodes = vec![start];
        best.insert(start, 0.0);
        heap.push(SmallestCostHolder { estimated_cost: 0.0, cost: 0.0, index: 0 });

        while let Some(SmallestCostHolder { cost, index, .. }) = heap.pop() {
            let current = nodes[index];
            if cost > best[&current] {
                continue;
            }
            if current == end {
                return Some(cost);
            }

            for &dir in args.directions() {
                let Some(next) = graph.get_neighbor(current, dir) else { continue };
                if !direction_traversable(graph, args, current, dir) {
                    continue;
                }
                let from_node = graph.node(&current).unwrap();
                let Some(step) = tile_cost(args, from_node, graph.node(&next).unwrap()) else {
                    continue;
                };
                let new_cost = cost + step;
                if best.get(&next).is_none_or(|&c| new_cost < c) {
                    best.insert(next, new_cost);
                    nodes.push(next);
                    heap.push(SmallestCostHolder {
                        estimated_cost: new_cost,
                        cost: new_cost,
                        index: nodes.len() - 1,
                    });
                }
            }
        }

        None
    }

    #[test]
    fn test_open_diagonal() {
        let (mut graph, world) = setup(IVec2::new(2, 2));
        let path = run(&mut graph, &world, tile(0, 0), tile(2, 2), &PathfindingArgs::new(1)).unwrap();

        assert_eq!(path.to_vec(), vec![tile(0, 0), tile(1, 1), tile(2, 2)]);
        assert!((path.cost() - 2.8).abs() < 0.05);
    }

    #[test]
    fn test_blocked_center_respects_corners() {
        let (mut graph, world) = setup(IVec2::new(2, 2));
        block(&mut graph, &world, tile(1, 1));

        let path = run(&mut graph, &world, tile(0, 0), tile(2, 2), &PathfindingArgs::new(1)).unwrap();

        assert!(!path.is_position_in_path(tile(1, 1)));
        assert_eq!(path.len(), 5);
        assert!((path.cost() - 4.0).abs() < 1e-4);
        assert_eq!(path.first(), Some(tile(0, 0)));
        assert_eq!(path.last(), Some(tile(2, 2)));
    }

    #[test]
    fn test_enclosed_goal_exhausts() {
        let (mut graph, world) = setup(IVec2::new(6, 6));
        for pos in [(2, 2), (3, 2), (4, 2), (2, 3), (4, 3), (2, 4), (3, 4), (4, 4)] {
            block(&mut graph, &world, tile(pos.0, pos.1));
        }

        let args = PathfindingArgs::new(1);
        assert!(run(&mut graph, &world, tile(0, 0), tile(3, 3), &args).is_none());
    }

    #[test]
    fn test_stays_inside_floor() {
        let (mut graph, world) = setup(IVec2::new(4, 0));
        let args = PathfindingArgs::new(1);

        let path = run(&mut graph, &world, tile(0, 0), tile(4, 0), &args).unwrap();
        assert_eq!(path.len(), 5);
        assert!(path.iter().all(|t| t.pos.y == 0));

        // the tile at (2, 0) becomes space: the corridor is cut
        let mut world = world;
        world.set_empty(tile(2, 0), true);
        graph.get_or_create_chunk(&world, tile(2, 0)).unwrap().update_node(&world, tile(2, 0));
        assert!(run(&mut graph, &world, tile(0, 0), tile(4, 0), &args).is_none());
        assert!(run(&mut graph, &world, tile(0, 0), tile(4, 0), &args.clone().with_space(true)).is_some());
    }

    #[test]
    fn test_cardinal_only() {
        let (mut graph, world) = setup(IVec2::new(3, 3));
        let args = PathfindingArgs::new(1).with_diagonals(false);

        let path = run(&mut graph, &world, tile(0, 0), tile(3, 3), &args).unwrap();
        assert_eq!(path.len(), 7);
        assert_eq!(path.cost(), 6.0);
        for pair in path.to_vec().windows(2) {
            let d = (pair[1].pos - pair[0].pos).abs();
            assert_eq!(d.x + d.y, 1);
        }
    }

    #[test]
    fn test_crosses_chunks() {
        let (mut graph, world) = setup(IVec2::new(40, 40));
        let path = run(&mut graph, &world, tile(1, 2), tile(38, 35), &PathfindingArgs::new(1)).unwrap();

        assert_eq!(path.first(), Some(tile(1, 2)));
        assert_eq!(path.last(), Some(tile(38, 35)));
        // 33 diagonal steps and 4 straight ones
        assert!((path.cost() - (33.0 * 1.4 + 4.0)).abs() < 1e-3);
    }

    #[test]
    fn test_matches_reference_cost() {
        let (mut graph, world) = setup(IVec2::new(20, 20));
        // an uneven set of walls
        for y in 0..15 {
            block(&mut graph, &world, tile(5, y));
        }
        for y in 6..21 {
            block(&mut graph, &world, tile(11, y));
        }
        for x in 13..19 {
            block(&mut graph, &world, tile(x, 9));
        }

        let args = PathfindingArgs::new(1);
        let cases = [
            (tile(0, 0), tile(20, 20)),
            (tile(2, 14), tile(16, 3)),
            (tile(15, 12), tile(0, 19)),
        ];

        for (from, to) in cases {
            let expected = reference_cost(&mut graph, &world, from, to, &args).unwrap();
            let path = run(&mut graph, &world, from, to, &args).unwrap();
            assert!(
                path.cost() <= expected * TIE_BREAKER + 1e-3,
                "{} -> {}: {} vs {}",
                from,
                to,
                path.cost(),
                expected
            );
        }
    }

    #[test]
    fn test_repeat_query_is_identical() {
        let (mut graph, world) = setup(IVec2::new(12, 12));
        block(&mut graph, &world, tile(6, 6));
        block(&mut graph, &world, tile(6, 5));
        let args = PathfindingArgs::new(1);

        let first = run(&mut graph, &world, tile(0, 3), tile(12, 8), &args).unwrap();
        let second = run(&mut graph, &world, tile(0, 3), tile(12, 8), &args).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.cost(), second.cost());
    }

    #[test]
    fn test_cancelled() {
        let (mut graph, world) = setup(IVec2::new(8, 8));
        let start = graph.get_node_ref(&world, tile(0, 0)).unwrap();
        let end = graph.get_node_ref(&world, tile(8, 8)).unwrap();
        let mut search = AStarSearch::new(start, end);
        let token = CancellationToken::new();
        token.cancel();

        assert!(matches!(
            search.step(&graph, &PathfindingArgs::new(1), 10, &token),
            SearchStep::Cancelled
        ));
    }

    #[test]
    fn test_budget_is_respected() {
        let (mut graph, world) = setup(IVec2::new(30, 30));
        let start = graph.get_node_ref(&world, tile(0, 0)).unwrap();
        let end = graph.get_node_ref(&world, tile(30, 30)).unwrap();
        let mut search = AStarSearch::new(start, end);
        let token = CancellationToken::new();

        assert!(matches!(
            search.step(&graph, &PathfindingArgs::new(1), 1, &token),
            SearchStep::Pending
        ));
        // one expansion discovers at most 8 neighbors
        assert!(search.visited.len() <= 9);
    }

    #[test]
    fn test_removed_grid() {
        let (mut graph, world) = setup(IVec2::new(30, 30));
        let start = graph.get_node_ref(&world, tile(0, 0)).unwrap();
        let end = graph.get_node_ref(&world, tile(30, 30)).unwrap();
        let mut search = AStarSearch::new(start, end);
        let token = CancellationToken::new();
        let args = PathfindingArgs::new(1);

        assert!(matches!(search.step(&graph, &args, 2, &token), SearchStep::Pending));
        graph.remove_grid(GRID);
        assert!(matches!(
            search.step(&graph, &args, 2, &token),
            SearchStep::GraphMissing
        ));
    }
}
