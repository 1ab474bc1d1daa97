//! Traversal policy shared by every search: distances, step costs, the corner-cutting rule,
//! end-node relaxation and path reconstruction.
use bevy::math::IVec2;

use crate::{
    access::AccessCredentials,
    dir::Dir,
    graph::GraphStore,
    node::{NodeRef, PathfindingNode},
    CollisionLayer, FxIndexMap, TileRef,
};

/// Weight applied to the heuristic so that f-score ties go to the node nearer the goal.
pub(crate) const TIE_BREAKER: f32 = 1.0 + 1.0 / 1000.0;

/// Which search algorithm a job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchKind {
    #[default]
    AStar,
    /// Jump point search. Needs diagonals; falls back to A* without them.
    JumpPoint,
}

/// Constraints for one path request.
#[derive(Debug, Clone, PartialEq)]
pub struct PathfindingArgs {
    /// Layers the agent collides with. Tiles whose blocked mask intersects it are not entered.
    pub collision_mask: CollisionLayer,
    /// Credentials shown to access readers.
    pub access: AccessCredentials,
    pub allow_diagonals: bool,
    /// Allow entering empty (space) tiles.
    pub allow_space: bool,
    /// Ignore blockers and access readers entirely.
    pub no_clip: bool,
    /// When greater than zero and the goal cannot be entered, stop next to it instead.
    pub proximity: f32,
    pub kind: SearchKind,
}

impl Default for PathfindingArgs {
    fn default() -> Self {
        PathfindingArgs {
            collision_mask: 0,
            access: AccessCredentials::default(),
            allow_diagonals: true,
            allow_space: false,
            no_clip: false,
            proximity: 0.0,
            kind: SearchKind::AStar,
        }
    }
}

impl PathfindingArgs {
    pub fn new(collision_mask: CollisionLayer) -> Self {
        PathfindingArgs {
            collision_mask,
            ..Default::default()
        }
    }

    pub fn with_access(mut self, access: AccessCredentials) -> Self {
        self.access = access;
        self
    }

    pub fn with_diagonals(mut self, allow: bool) -> Self {
        self.allow_diagonals = allow;
        self
    }

    pub fn with_space(mut self, allow: bool) -> Self {
        self.allow_space = allow;
        self
    }

    pub fn with_no_clip(mut self, no_clip: bool) -> Self {
        self.no_clip = no_clip;
        self
    }

    pub fn with_proximity(mut self, proximity: f32) -> Self {
        self.proximity = proximity;
        self
    }

    pub fn with_kind(mut self, kind: SearchKind) -> Self {
        self.kind = kind;
        self
    }

    /// Directions a search may step in.
    pub(crate) fn directions(&self) -> &'static [Dir] {
        const CARDINAL: [Dir; 4] = [Dir::North, Dir::East, Dir::South, Dir::West];
        const ALL: [Dir; 8] = [
            Dir::North,
            Dir::East,
            Dir::South,
            Dir::West,
            Dir::NorthEast,
            Dir::SouthEast,
            Dir::SouthWest,
            Dir::NorthWest,
        ];

        if self.allow_diagonals {
            &ALL
        } else {
            &CARDINAL
        }
    }

    /// Collision and access check for these args.
    pub fn traversable(&self, node: &PathfindingNode) -> bool {
        node.is_traversable(self.collision_mask, &self.access)
    }
}

/// Octile distance: diagonal steps cost 1.4, straight steps 1.
pub fn octile_distance(a: IVec2, b: IVec2) -> f32 {
    let d = (a - b).abs();
    let (short, long) = (d.x.min(d.y), d.x.max(d.y));
    1.4 * short as f32 + (long - short) as f32
}

pub fn manhattan_distance(a: IVec2, b: IVec2) -> f32 {
    let d = (a - b).abs();
    (d.x + d.y) as f32
}

/// Distance between two tiles under the movement rules of `args`. Octile distance is only used
/// when diagonal steps are actually allowed.
pub fn distance(args: &PathfindingArgs, a: IVec2, b: IVec2) -> f32 {
    if args.allow_diagonals {
        octile_distance(a, b)
    } else {
        manhattan_distance(a, b)
    }
}

/// Whether a search with these args may stand on `node`.
pub fn enterable(args: &PathfindingArgs, node: &PathfindingNode) -> bool {
    (args.no_clip || args.traversable(node)) && (args.allow_space || !node.is_empty())
}

/// Cost of moving from `start` to `end`, or `None` if `end` cannot be entered.
pub fn tile_cost(args: &PathfindingArgs, start: &PathfindingNode, end: &PathfindingNode) -> Option<f32> {
    enterable(args, end).then(|| distance(args, start.tile().pos, end.tile().pos))
}

/// Whether a step in `dir` is allowed by the corner-cutting rule. Cardinal steps always are;
/// a diagonal step needs both flanking cardinal neighbors to exist and be traversable.
pub fn direction_traversable(
    graph: &GraphStore,
    args: &PathfindingArgs,
    node: NodeRef,
    dir: Dir,
) -> bool {
    let Some((a, b)) = dir.flanks() else {
        return true;
    };

    [a, b].into_iter().all(|flank| {
        graph
            .get_neighbor(node, flank)
            .and_then(|n| graph.node(&n))
            .is_some_and(|n| args.no_clip || args.traversable(n))
    })
}

/// Picks the node a search should actually aim for.
///
/// A goal the search may enter is kept. Otherwise, with a proximity tolerance set, the first
/// enterable neighbor in [`Dir`] order is used. This is not necessarily the nearest reachable tile.
pub fn try_end_node(graph: &GraphStore, args: &PathfindingArgs, end: NodeRef) -> Option<NodeRef> {
    let node = graph.node(&end)?;
    if enterable(args, node) {
        return Some(end);
    }

    if args.proximity <= 0.0 {
        return None;
    }

    graph
        .neighbors(end)
        .map(|(_, n)| n)
        .find(|n| graph.node(n).is_some_and(|node| enterable(args, node)))
}

/// Walks the came-from chain from `end` back to the start. Returns tiles start-first.
///
/// `visited` maps each node to its parent's index (`usize::MAX` for the start) and its g-score.
pub(crate) fn reconstruct_path(visited: &FxIndexMap<NodeRef, (usize, f32)>, end: usize) -> Vec<TileRef> {
    let mut steps = Vec::new();
    let mut current = end;

    while let Some((node, &(parent, _))) = visited.get_index(current) {
        steps.push(node.tile());
        current = parent;
    }

    steps.reverse();
    steps
}

/// Like [`reconstruct_path`], but fills in the tiles skipped between non-adjacent links, walking
/// one diagonal or straight step at a time.
pub(crate) fn reconstruct_jump_path(
    visited: &FxIndexMap<NodeRef, (usize, f32)>,
    end: usize,
) -> Vec<TileRef> {
    let jumps = reconstruct_path(visited, end);
    let mut steps = Vec::with_capacity(jumps.len());

    let mut iter = jumps.into_iter();
    let Some(mut last) = iter.next() else {
        return steps;
    };
    steps.push(last);

    for next in iter {
        while last.pos != next.pos {
            let step = (next.pos - last.pos).signum();
            last = TileRef::new(next.grid, last.pos + step);
            steps.push(last);
        }
    }

    steps
}
