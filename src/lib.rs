//! Tile pathfinding over chunked, mutable grid worlds.
//!
//! The crate keeps a navigation graph of 16x16 chunks per grid, replays world changes into it in
//! bounded batches every tick, and runs A* (or jump point) searches as incremental jobs that are
//! stepped a little each tick.
//!
//! [`system::PathfindingSystem`] is the entry point when driving the crate by hand;
//! [`plugin::PathfindingPlugin`] wires it into a Bevy `App`.
use std::cmp::Ordering;
use std::fmt;
use std::hash::BuildHasherDefault;

use bevy::math::IVec2;
use indexmap::IndexMap;
use rustc_hash::FxHasher;

use crate::dir::Dir;

#[macro_use]
mod macros;

pub mod access;
mod astar;
pub mod changes;
pub mod chunk;
pub mod dir;
pub mod error;
pub mod graph;
pub mod job;
mod jps;
pub mod node;
pub mod path;
pub mod plugin;
mod scheduler;
pub mod settings;
pub mod system;
pub mod traversal;
pub mod world;

pub mod prelude {
    pub use crate::access::{AccessCredentials, AccessList, AccessReader};
    pub use crate::changes::{Body, GraphChange};
    pub use crate::chunk::{Chunk, CHUNK_SIZE};
    pub use crate::dir::Dir;
    pub use crate::error::PathfindingError;
    pub use crate::graph::GraphStore;
    pub use crate::job::{CancellationToken, JobHandle, JobId, JobState, PathOutcome};
    pub use crate::node::{NodeRef, Occupant, PathfindingNode};
    pub use crate::path::Path;
    pub use crate::plugin::{PathCompleted, PathfindingPlugin, PathfindingSet, WorldChange};
    pub use crate::settings::{PathfindingSettings, PathfindingSettingsBuilder};
    pub use crate::system::PathfindingSystem;
    pub use crate::traversal::{PathfindingArgs, SearchKind};
    pub use crate::world::{TileData, TileMap, TileSource};
    pub use crate::{CollisionLayer, GridId, TileRef};
}

/// Bitmask of collision layers.
pub type CollisionLayer = u32;

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// Identifies one grid (a map, a ship, a station...) in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridId(pub u32);

impl fmt::Display for GridId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "grid#{}", self.0)
    }
}

/// One tile: the grid it lives on and its integer position in that grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileRef {
    pub grid: GridId,
    pub pos: IVec2,
}

impl TileRef {
    pub fn new(grid: GridId, pos: IVec2) -> Self {
        TileRef { grid, pos }
    }

    pub fn x(&self) -> i32 {
        self.pos.x
    }

    pub fn y(&self) -> i32 {
        self.pos.y
    }

    /// The adjacent tile in the given direction, on the same grid.
    pub fn offset(&self, dir: Dir) -> TileRef {
        TileRef::new(self.grid, self.pos + dir.vector())
    }
}

impl fmt::Display for TileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}, {})", self.grid, self.pos.x, self.pos.y)
    }
}

/// Open set entry. Ordered so that `BinaryHeap` pops the smallest estimated cost first, preferring
/// the deeper node when estimates tie.
pub(crate) struct SmallestCostHolder {
    pub(crate) estimated_cost: f32,
    pub(crate) cost: f32,
    pub(crate) index: usize,
}

impl PartialEq for SmallestCostHolder {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SmallestCostHolder {}

impl PartialOrd for SmallestCostHolder {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SmallestCostHolder {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.estimated_cost.total_cmp(&self.estimated_cost) {
            Ordering::Equal => self.cost.total_cmp(&other.cost),
            s => s,
        }
    }
}
