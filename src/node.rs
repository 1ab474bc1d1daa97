//! This module defines the `PathfindingNode` struct, one tile of the navigation graph.
use std::fmt;
use std::sync::Arc;

use bevy::{ecs::entity::Entity, math::IVec2};
use rustc_hash::FxHashMap;

use crate::{
    access::{AccessCredentials, AccessReader},
    chunk::CHUNK_SIZE,
    dir::Dir,
    world::TileData,
    CollisionLayer, FxIndexMap, GridId, TileRef,
};

/// Arena handle to a node: the owning chunk plus the node's index inside it.
///
/// Handles are resolved through the [`crate::graph::GraphStore`]. A handle taken before its grid
/// was removed never resolves again, even if a grid with the same id is added later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub(crate) grid: GridId,
    pub(crate) generation: u32,
    pub(crate) chunk: IVec2,
    pub(crate) index: u16,
}

impl NodeRef {
    pub fn grid(&self) -> GridId {
        self.grid
    }

    pub fn chunk_origin(&self) -> IVec2 {
        self.chunk
    }

    /// The tile this node stands for. Computed from the handle alone.
    pub fn tile(&self) -> TileRef {
        let local = IVec2::new(
            self.index as i32 / CHUNK_SIZE,
            self.index as i32 % CHUNK_SIZE,
        );
        TileRef::new(self.grid, self.chunk + local)
    }
}

/// What an entity standing on a tile means for traversal.
#[derive(Clone)]
pub enum Occupant {
    /// Anchored/static blocker. Its layer is part of the node's blocked mask.
    Blocker(CollisionLayer),
    /// Moving occupant. Tracked for information only, never blocks.
    Transient(CollisionLayer),
    /// Door-like entity gating the tile with an access predicate.
    Access(Arc<dyn AccessReader>),
}

impl fmt::Debug for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occupant::Blocker(layer) => f.debug_tuple("Blocker").field(layer).finish(),
            Occupant::Transient(layer) => f.debug_tuple("Transient").field(layer).finish(),
            Occupant::Access(_) => f.write_str("Access(..)"),
        }
    }
}

/// A single tile in the navigation graph.
pub struct PathfindingNode {
    /// Current tile. The node is reused across tile changes.
    tile: TileRef,
    /// Origin of the owning chunk.
    chunk: IVec2,
    data: TileData,
    /// OR of all blocker layers, regenerated whenever `blockers` changes.
    blocked_mask: CollisionLayer,
    blockers: FxHashMap<Entity, CollisionLayer>,
    transients: FxHashMap<Entity, CollisionLayer>,
    access_readers: FxIndexMap<Entity, Arc<dyn AccessReader>>,
    /// Directions whose neighbor lives in the same chunk.
    pub(crate) neighbor_bits: u8,
}

impl PathfindingNode {
    pub(crate) fn new(tile: TileRef, chunk: IVec2) -> Self {
        PathfindingNode {
            tile,
            chunk,
            data: TileData::default(),
            blocked_mask: 0,
            blockers: FxHashMap::default(),
            transients: FxHashMap::default(),
            access_readers: FxIndexMap::default(),
            neighbor_bits: 0,
        }
    }

    pub fn tile(&self) -> TileRef {
        self.tile
    }

    pub fn chunk_origin(&self) -> IVec2 {
        self.chunk
    }

    /// Position inside the owning chunk.
    pub fn local(&self) -> IVec2 {
        self.tile.pos - self.chunk
    }

    pub fn is_empty(&self) -> bool {
        self.data.empty
    }

    pub fn blocked_mask(&self) -> CollisionLayer {
        self.blocked_mask
    }

    pub fn blockers(&self) -> impl Iterator<Item = (Entity, CollisionLayer)> + '_ {
        self.blockers.iter().map(|(&e, &layer)| (e, layer))
    }

    pub fn transients(&self) -> impl Iterator<Item = (Entity, CollisionLayer)> + '_ {
        self.transients.iter().map(|(&e, &layer)| (e, layer))
    }

    pub fn access_readers(&self) -> impl Iterator<Item = &Arc<dyn AccessReader>> {
        self.access_readers.values()
    }

    /// True if the node tracks the entity in any category.
    pub fn contains(&self, entity: Entity) -> bool {
        self.blockers.contains_key(&entity)
            || self.transients.contains_key(&entity)
            || self.access_readers.contains_key(&entity)
    }

    pub(crate) fn has_local_neighbor(&self, dir: Dir) -> bool {
        self.neighbor_bits & dir.bit() != 0
    }

    /// Refreshes the static tile properties. Occupants and neighbor wiring are untouched.
    pub(crate) fn update_tile(&mut self, tile: TileRef, data: TileData) {
        self.tile = tile;
        self.data = data;
    }

    /// Registers an entity on this tile. An entity is only ever in one category, so any previous
    /// registration of it is replaced.
    pub fn add_blocker(&mut self, entity: Entity, occupant: Occupant) {
        self.remove_blocker(entity);

        match occupant {
            Occupant::Blocker(layer) => {
                self.blockers.insert(entity, layer);
                self.regenerate_mask();
            }
            Occupant::Transient(layer) => {
                self.transients.insert(entity, layer);
            }
            Occupant::Access(reader) => {
                self.access_readers.insert(entity, reader);
            }
        }
    }

    /// Removes an entity from whichever category holds it, checking transients, then access
    /// readers, then blockers. Returns what it was registered as.
    pub fn remove_blocker(&mut self, entity: Entity) -> Option<Occupant> {
        if let Some(layer) = self.transients.remove(&entity) {
            return Some(Occupant::Transient(layer));
        }

        if let Some(reader) = self.access_readers.shift_remove(&entity) {
            return Some(Occupant::Access(reader));
        }

        let layer = self.blockers.remove(&entity)?;
        self.regenerate_mask();
        Some(Occupant::Blocker(layer))
    }

    fn regenerate_mask(&mut self) {
        self.blocked_mask = self.blockers.values().fold(0, |mask, layer| mask | layer);
    }

    /// The single traversal rule: the collision mask must not hit any blocker layer, and every
    /// access reader on the tile must allow the credentials.
    pub fn is_traversable(&self, collision_mask: CollisionLayer, access: &AccessCredentials) -> bool {
        if collision_mask & self.blocked_mask != 0 {
            return false;
        }

        self.access_readers
            .values()
            .all(|reader| reader.is_allowed(access))
    }
}

impl fmt::Debug for PathfindingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathfindingNode")
            .field("tile", &self.tile)
            .field("empty", &self.data.empty)
            .field("blocked_mask", &self.blocked_mask)
            .field("blockers", &self.blockers.len())
            .field("transients", &self.transients.len())
            .field("access_readers", &self.access_readers.len())
            .finish()
    }
}
