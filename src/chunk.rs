//! This module defines the `Chunk` struct, a fixed 16x16 block of nodes.
use bevy::math::IVec2;
use ndarray::Array2;

use crate::{
    dir::Dir,
    node::{NodeRef, PathfindingNode},
    world::TileSource,
    GridId, TileRef,
};

/// Width and height of every chunk, in tiles.
pub const CHUNK_SIZE: i32 = 16;

/// Origin of the chunk containing `pos`: each coordinate floored to a multiple of [`CHUNK_SIZE`].
pub fn chunk_origin(pos: IVec2) -> IVec2 {
    IVec2::new(
        pos.x.div_euclid(CHUNK_SIZE) * CHUNK_SIZE,
        pos.y.div_euclid(CHUNK_SIZE) * CHUNK_SIZE,
    )
}

/// Flat index of a chunk-local position. Inverse of [`crate::node::NodeRef::tile`].
pub(crate) fn local_index(local: IVec2) -> u16 {
    (local.x * CHUNK_SIZE + local.y) as u16
}

/// A chunk owns the nodes for a 16x16 block of one grid.
#[derive(Debug)]
pub struct Chunk {
    grid: GridId,
    generation: u32,
    origin: IVec2,
    nodes: Array2<PathfindingNode>,
    initialized: bool,
    dirty: bool,
}

impl Chunk {
    /// Allocates one node per cell. Call [`Chunk::initialize`] before exposing the chunk.
    pub(crate) fn new(grid: GridId, generation: u32, origin: IVec2) -> Self {
        let size = CHUNK_SIZE as usize;
        let nodes = Array2::from_shape_fn((size, size), |(x, y)| {
            let pos = origin + IVec2::new(x as i32, y as i32);
            PathfindingNode::new(TileRef::new(grid, pos), origin)
        });

        Chunk {
            grid,
            generation,
            origin,
            nodes,
            initialized: false,
            dirty: true,
        }
    }

    /// Loads live tile data into every node and wires the intra-chunk neighbor links.
    ///
    /// # Panics
    /// If called twice.
    pub(crate) fn initialize<W: TileSource + ?Sized>(&mut self, world: &W) {
        assert!(
            !self.initialized,
            "chunk {} of {} initialized twice",
            self.origin, self.grid
        );

        for ((x, y), node) in self.nodes.indexed_iter_mut() {
            let tile = node.tile();
            node.update_tile(tile, world.tile(tile));
            node.neighbor_bits = local_neighbor_bits(IVec2::new(x as i32, y as i32));
        }

        self.initialized = true;
    }

    pub fn grid(&self) -> GridId {
        self.grid
    }

    pub fn origin(&self) -> IVec2 {
        self.origin
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Has any node changed since the flag was last cleared.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn contains(&self, pos: IVec2) -> bool {
        let local = pos - self.origin;
        (0..CHUNK_SIZE).contains(&local.x) && (0..CHUNK_SIZE).contains(&local.y)
    }

    fn index_of(&self, pos: IVec2) -> Option<u16> {
        if !self.contains(pos) {
            return None;
        }

        Some(local_index(pos - self.origin))
    }

    /// Node handle for a position inside this chunk.
    pub fn node_ref(&self, pos: IVec2) -> Option<NodeRef> {
        self.index_of(pos).map(|index| NodeRef {
            grid: self.grid,
            generation: self.generation,
            chunk: self.origin,
            index,
        })
    }

    pub(crate) fn node(&self, index: u16) -> &PathfindingNode {
        let index = index as usize;
        let size = CHUNK_SIZE as usize;
        &self.nodes[[index / size, index % size]]
    }

    /// Mutable access to a node. Marks the chunk dirty.
    pub(crate) fn node_mut(&mut self, index: u16) -> &mut PathfindingNode {
        self.dirty = true;
        let index = index as usize;
        let size = CHUNK_SIZE as usize;
        &mut self.nodes[[index / size, index % size]]
    }

    pub fn node_at(&self, pos: IVec2) -> Option<&PathfindingNode> {
        self.index_of(pos).map(|index| self.node(index))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PathfindingNode> {
        self.nodes.iter()
    }

    /// True if the node sits on the outer ring of the chunk, where some neighbors live in other
    /// chunks.
    pub fn on_edge(&self, node: &PathfindingNode) -> bool {
        let local = node.local();
        local.x == 0 || local.y == 0 || local.x == CHUNK_SIZE - 1 || local.y == CHUNK_SIZE - 1
    }

    /// Origins of the 8 chunks around this one, whether or not they exist yet.
    pub fn neighbor_origins(&self) -> impl Iterator<Item = IVec2> + '_ {
        Dir::all().map(move |dir| self.origin + dir.vector() * CHUNK_SIZE)
    }

    /// Re-reads the tile data of one cell. Neighbor wiring is left alone.
    /// Returns false if the tile is not in this chunk.
    pub fn update_node<W: TileSource + ?Sized>(&mut self, world: &W, tile: TileRef) -> bool {
        let Some(index) = self.index_of(tile.pos).filter(|_| tile.grid == self.grid) else {
            return false;
        };

        self.node_mut(index).update_tile(tile, world.tile(tile));
        true
    }
}

fn local_neighbor_bits(local: IVec2) -> u8 {
    Dir::all()
        .filter(|dir| {
            let n = local + dir.vector();
            (0..CHUNK_SIZE).contains(&n.x) && (0..CHUNK_SIZE).contains(&n.y)
        })
        .fold(0, |bits, dir| bits | dir.bit())
}
