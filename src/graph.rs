//! The `GraphStore`: every chunk of every grid, created lazily.
use bevy::{log, math::IVec2};
use rustc_hash::FxHashMap;

use crate::{
    chunk::{chunk_origin, local_index, Chunk, CHUNK_SIZE},
    dir::Dir,
    error::PathfindingError,
    node::{NodeRef, PathfindingNode},
    world::TileSource,
    GridId, TileRef,
};

/// Chunks of one grid, keyed by chunk origin.
#[derive(Debug)]
struct GridGraph {
    generation: u32,
    chunks: FxHashMap<IVec2, Chunk>,
}

/// Per-grid collection of chunks.
///
/// Chunks store no links to each other: the chunk next to an edge node is looked up here every
/// time it is needed, so a chunk created later is picked up by its older neighbors automatically.
#[derive(Debug, Default)]
pub struct GraphStore {
    grids: FxHashMap<GridId, GridGraph>,
    next_generation: u32,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a grid. Returns false if it was already tracked.
    pub fn add_grid(&mut self, grid: GridId) -> bool {
        if self.grids.contains_key(&grid) {
            return false;
        }

        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        self.grids.insert(
            grid,
            GridGraph {
                generation,
                chunks: FxHashMap::default(),
            },
        );

        log::debug!("Added {} to the pathfinding graph", grid);
        true
    }

    /// Builds every chunk inside the grid's bounds, if the world reports any.
    pub fn populate<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        grid: GridId,
    ) -> Result<usize, PathfindingError> {
        if !self.has_grid(grid) {
            return Err(PathfindingError::UnknownGrid(grid));
        }

        let Some(bounds) = world.bounds(grid) else {
            return Ok(0);
        };

        let min = chunk_origin(bounds.min);
        let max = chunk_origin(bounds.max);
        let mut created = 0;

        for x in (min.x..=max.x).step_by(CHUNK_SIZE as usize) {
            for y in (min.y..=max.y).step_by(CHUNK_SIZE as usize) {
                let tile = TileRef::new(grid, IVec2::new(x, y));
                if self.get_chunk(tile).is_none() {
                    self.get_or_create_chunk(world, tile)?;
                    created += 1;
                }
            }
        }

        Ok(created)
    }

    /// Drops every chunk of a grid. Handles into it stop resolving and later lookups fail until the
    /// grid is added again.
    pub fn remove_grid(&mut self, grid: GridId) -> bool {
        match self.grids.remove(&grid) {
            Some(removed) => {
                log::debug!(
                    "Removed {} and its {} chunks from the pathfinding graph",
                    grid,
                    removed.chunks.len()
                );
                true
            }
            None => false,
        }
    }

    pub fn has_grid(&self, grid: GridId) -> bool {
        self.grids.contains_key(&grid)
    }

    pub fn grids(&self) -> impl Iterator<Item = GridId> + '_ {
        self.grids.keys().copied()
    }

    pub fn chunk_count(&self, grid: GridId) -> usize {
        self.grids.get(&grid).map_or(0, |g| g.chunks.len())
    }

    pub fn clear(&mut self) {
        self.grids.clear();
    }

    /// Returns the chunk containing the tile, creating and initializing it on first access.
    pub fn get_or_create_chunk<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        tile: TileRef,
    ) -> Result<&mut Chunk, PathfindingError> {
        let grid_graph = self
            .grids
            .get_mut(&tile.grid)
            .ok_or(PathfindingError::UnknownGrid(tile.grid))?;
        let generation = grid_graph.generation;
        let origin = chunk_origin(tile.pos);

        Ok(grid_graph.chunks.entry(origin).or_insert_with(|| {
            let mut chunk = Chunk::new(tile.grid, generation, origin);
            chunk.initialize(world);
            log::debug!("Created chunk {} on {}", origin, tile.grid);
            chunk
        }))
    }

    /// The chunk containing the tile, if it exists.
    pub fn get_chunk(&self, tile: TileRef) -> Option<&Chunk> {
        self.grids
            .get(&tile.grid)?
            .chunks
            .get(&chunk_origin(tile.pos))
    }

    /// The up to 8 chunks around `chunk` that currently exist.
    pub fn neighboring_chunks<'a>(&'a self, chunk: &'a Chunk) -> impl Iterator<Item = &'a Chunk> {
        let chunks = self.grids.get(&chunk.grid()).map(|g| &g.chunks);
        chunk
            .neighbor_origins()
            .filter_map(move |origin| chunks?.get(&origin))
    }

    /// Handle to the node of a tile, creating its chunk if needed.
    pub fn get_node_ref<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        tile: TileRef,
    ) -> Result<NodeRef, PathfindingError> {
        let chunk = self.get_or_create_chunk(world, tile)?;

        Ok(NodeRef {
            grid: tile.grid,
            generation: chunk.generation(),
            chunk: chunk.origin(),
            index: local_index(tile.pos - chunk.origin()),
        })
    }

    /// The node of a tile, creating its chunk if needed. Repeated calls return the same node.
    pub fn get_node<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        tile: TileRef,
    ) -> Result<&PathfindingNode, PathfindingError> {
        let node_ref = self.get_node_ref(world, tile)?;
        self.node(&node_ref)
            .ok_or(PathfindingError::StaleNode(node_ref))
    }

    /// Mutable node of a tile, creating its chunk if needed. Marks the chunk dirty.
    pub fn get_node_mut<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        tile: TileRef,
    ) -> Result<&mut PathfindingNode, PathfindingError> {
        let node_ref = self.get_node_ref(world, tile)?;
        self.node_mut(&node_ref)
            .ok_or(PathfindingError::StaleNode(node_ref))
    }

    fn chunk_for(&self, node: &NodeRef) -> Option<&Chunk> {
        let grid = self.grids.get(&node.grid)?;
        if grid.generation != node.generation {
            return None;
        }
        grid.chunks.get(&node.chunk)
    }

    /// Resolves a handle. `None` once its grid has been removed.
    pub fn node(&self, node: &NodeRef) -> Option<&PathfindingNode> {
        self.chunk_for(node).map(|chunk| chunk.node(node.index))
    }

    pub(crate) fn node_mut(&mut self, node: &NodeRef) -> Option<&mut PathfindingNode> {
        let grid = self.grids.get_mut(&node.grid)?;
        if grid.generation != node.generation {
            return None;
        }
        grid.chunks
            .get_mut(&node.chunk)
            .map(|chunk| chunk.node_mut(node.index))
    }

    /// Neighbor of a node in a direction. Edge nodes look the sibling chunk up in the store;
    /// a missing chunk is a hole and yields `None`.
    pub fn get_neighbor(&self, node: NodeRef, dir: Dir) -> Option<NodeRef> {
        let chunk = self.chunk_for(&node)?;
        let current = chunk.node(node.index);
        let pos = current.tile().pos + dir.vector();

        if current.has_local_neighbor(dir) {
            return chunk.node_ref(pos);
        }

        self.grids
            .get(&node.grid)?
            .chunks
            .get(&chunk_origin(pos))?
            .node_ref(pos)
    }

    /// All existing neighbors of a node, in [`Dir`] order.
    pub fn neighbors(&self, node: NodeRef) -> impl Iterator<Item = (Dir, NodeRef)> + '_ {
        Dir::all().filter_map(move |dir| self.get_neighbor(node, dir).map(|n| (dir, n)))
    }

    /// Returns the chunks touched since the last call and clears their dirty flags.
    pub fn take_dirty_chunks(&mut self) -> Vec<(GridId, IVec2)> {
        let mut dirty = Vec::new();
        for (&grid, grid_graph) in self.grids.iter_mut() {
            for (&origin, chunk) in grid_graph.chunks.iter_mut() {
                if chunk.is_dirty() {
                    chunk.clear_dirty();
                    dirty.push((grid, origin));
                }
            }
        }
        dirty
    }
}
