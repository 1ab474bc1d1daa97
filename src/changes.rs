//! Queued world changes and the pipeline that replays them into the graph.
use std::collections::VecDeque;
use std::sync::Arc;

use bevy::{ecs::entity::Entity, log};
use rustc_hash::FxHashMap;

use crate::{
    access::AccessReader,
    error::PathfindingError,
    graph::GraphStore,
    node::Occupant,
    world::TileSource,
    CollisionLayer, GridId, TileRef,
};

/// Collision properties of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Body {
    pub layer: CollisionLayer,
    /// Anchored bodies block their tile. Others are only tracked.
    pub anchored: bool,
}

impl Body {
    pub fn new(layer: CollisionLayer, anchored: bool) -> Self {
        Body { layer, anchored }
    }
}

/// One world change waiting to be applied to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    /// Static tile data changed.
    TileUpdate(TileRef),
    /// An entity started colliding on a tile.
    CollidableAdd {
        entity: Entity,
        tile: TileRef,
        body: Body,
    },
    /// An entity stopped colliding or was deleted.
    CollidableRemove(Entity),
    /// An entity moved between tiles.
    CollidableMove {
        entity: Entity,
        old: TileRef,
        new: TileRef,
        layer: CollisionLayer,
    },
    GridAdded(GridId),
    GridRemoved(GridId),
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    tile: TileRef,
    anchored: bool,
}

/// FIFO of pending [`GraphChange`]s plus the bookkeeping needed to apply them: the last tile each
/// entity was registered on and the access readers entities have registered.
pub struct ChangeQueue {
    pending: VecDeque<GraphChange>,
    last_known: FxHashMap<Entity, Tracked>,
    access_readers: FxHashMap<Entity, Arc<dyn AccessReader>>,
    backlog_warning: usize,
}

impl ChangeQueue {
    pub fn new(backlog_warning: usize) -> Self {
        ChangeQueue {
            pending: VecDeque::new(),
            last_known: FxHashMap::default(),
            access_readers: FxHashMap::default(),
            backlog_warning,
        }
    }

    pub fn push(&mut self, change: GraphChange) {
        self.pending.push_back(change);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending(&self) -> impl Iterator<Item = &GraphChange> {
        self.pending.iter()
    }

    /// Tile the entity is currently registered on, if any.
    pub fn last_known(&self, entity: Entity) -> Option<TileRef> {
        self.last_known.get(&entity).map(|t| t.tile)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_known.clear();
        self.access_readers.clear();
    }

    /// Applies at most `max` queued changes, oldest first. Returns how many were applied.
    pub fn process<W: TileSource + ?Sized>(
        &mut self,
        graph: &mut GraphStore,
        world: &W,
        max: usize,
    ) -> usize {
        if self.pending.len() > self.backlog_warning {
            log::warn!(
                "{} graph changes are queued, more than the warning threshold of {}",
                self.pending.len(),
                self.backlog_warning
            );
        }

        let mut applied = 0;
        while applied < max {
            let Some(change) = self.pending.pop_front() else {
                break;
            };
            self.apply(graph, world, change);
            applied += 1;
        }

        applied
    }

    fn apply<W: TileSource + ?Sized>(&mut self, graph: &mut GraphStore, world: &W, change: GraphChange) {
        match change {
            GraphChange::TileUpdate(tile) => match graph.get_or_create_chunk(world, tile) {
                Ok(chunk) => {
                    chunk.update_node(world, tile);
                }
                Err(err) => log::debug!("Dropped tile update for {}: {}", tile, err),
            },
            GraphChange::CollidableAdd { entity, tile, body } => {
                if self.last_known.contains_key(&entity) {
                    return;
                }
                self.register(graph, world, entity, tile, body);
            }
            GraphChange::CollidableRemove(entity) => {
                let Some(tracked) = self.last_known.remove(&entity) else {
                    return;
                };
                Self::unregister(graph, world, entity, tracked.tile);
            }
            GraphChange::CollidableMove {
                entity,
                old,
                new,
                layer,
            } => {
                let Some(tracked) = self.last_known.get(&entity).copied() else {
                    return;
                };

                if old == new {
                    return;
                }

                self.last_known.remove(&entity);
                Self::unregister(graph, world, entity, tracked.tile);
                self.register(graph, world, entity, new, Body::new(layer, tracked.anchored));
            }
            GraphChange::GridAdded(grid) => {
                graph.add_grid(grid);
                if let Err(err) = graph.populate(world, grid) {
                    log::debug!("Could not populate {}: {}", grid, err);
                }
            }
            GraphChange::GridRemoved(grid) => {
                graph.remove_grid(grid);
                self.last_known.retain(|_, tracked| tracked.tile.grid != grid);
            }
        }
    }

    /// Puts the entity on a node in the category it belongs to and records where it is.
    fn register<W: TileSource + ?Sized>(
        &mut self,
        graph: &mut GraphStore,
        world: &W,
        entity: Entity,
        tile: TileRef,
        body: Body,
    ) {
        let occupant = match self.access_readers.get(&entity) {
            Some(reader) => Occupant::Access(reader.clone()),
            None if body.anchored => Occupant::Blocker(body.layer),
            None => Occupant::Transient(body.layer),
        };

        match graph.get_node_mut(world, tile) {
            Ok(node) => {
                node.add_blocker(entity, occupant);
                self.last_known.insert(
                    entity,
                    Tracked {
                        tile,
                        anchored: body.anchored,
                    },
                );
            }
            Err(err) => log::debug!("Dropped {:?} on {}: {}", entity, tile, err),
        }
    }

    fn unregister<W: TileSource + ?Sized>(
        graph: &mut GraphStore,
        world: &W,
        entity: Entity,
        tile: TileRef,
    ) {
        if let Ok(node) = graph.get_node_mut(world, tile) {
            node.remove_blocker(entity);
        }
    }

    /// Registers a door-like access reader on a tile right away, bypassing the queue.
    pub fn register_access_reader<W: TileSource + ?Sized>(
        &mut self,
        graph: &mut GraphStore,
        world: &W,
        entity: Entity,
        tile: TileRef,
        reader: Arc<dyn AccessReader>,
    ) -> Result<(), PathfindingError> {
        if let Some(tracked) = self.last_known.remove(&entity) {
            Self::unregister(graph, world, entity, tracked.tile);
        }

        graph
            .get_node_mut(world, tile)?
            .add_blocker(entity, Occupant::Access(reader.clone()));
        self.access_readers.insert(entity, reader);
        self.last_known.insert(
            entity,
            Tracked {
                tile,
                anchored: true,
            },
        );
        Ok(())
    }

    /// Removes an entity's access reader right away. Returns false if it had none.
    pub fn unregister_access_reader<W: TileSource + ?Sized>(
        &mut self,
        graph: &mut GraphStore,
        world: &W,
        entity: Entity,
    ) -> bool {
        if self.access_readers.remove(&entity).is_none() {
            return false;
        }

        if let Some(tracked) = self.last_known.remove(&entity) {
            Self::unregister(graph, world, entity, tracked.tile);
        }
        true
    }
}
