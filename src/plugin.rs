//! Bevy integration: a plugin that feeds world changes into the [`PathfindingSystem`] resource
//! and publishes finished searches as events.
use std::marker::PhantomData;

use bevy::{log, prelude::*};

use crate::{
    changes::Body,
    job::PathOutcome,
    settings::PathfindingSettings,
    system::PathfindingSystem,
    world::TileSource,
    CollisionLayer, GridId, TileRef,
};

/// Adds a [`PathfindingSystem`] resource fed by world events, for a world resource `W`.
///
/// Send a [`WorldChange`] for every change to the world the graph should follow. Request paths
/// through the [`PathfindingSystem`] resource; finished jobs are published as [`PathCompleted`]
/// events rather than kept for [`PathfindingSystem::take_outcome`].
pub struct PathfindingPlugin<W: TileSource + Resource> {
    settings: PathfindingSettings,
    _world: PhantomData<W>,
}

impl<W: TileSource + Resource> Default for PathfindingPlugin<W> {
    fn default() -> Self {
        PathfindingPlugin {
            settings: PathfindingSettings::default(),
            _world: PhantomData,
        }
    }
}

impl<W: TileSource + Resource> PathfindingPlugin<W> {
    pub fn new(settings: PathfindingSettings) -> Self {
        PathfindingPlugin {
            settings,
            _world: PhantomData,
        }
    }
}

impl<W: TileSource + Resource> Plugin for PathfindingPlugin<W> {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<Time>() {
            app.init_resource::<Time>();
        }

        app.insert_resource(PathfindingSystem::new(self.settings.clone()))
            .add_event::<WorldChange>()
            .add_event::<PathCompleted>()
            .add_systems(
                Update,
                (queue_world_changes, update_pathfinding::<W>, publish_outcomes)
                    .chain()
                    .in_set(PathfindingSet),
            );
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathfindingSet;

/// A change to the world the pathfinding graph follows. Changes are queued in the order they
/// were sent, across all variants.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldChange {
    GridAdded(GridId),
    GridRemoved(GridId),
    TileChanged(TileRef),
    /// An entity's collision was enabled or disabled.
    CollisionChanged {
        entity: Entity,
        enabled: bool,
        tile: TileRef,
        body: Body,
    },
    /// An entity moved to a different tile.
    EntityMoved {
        entity: Entity,
        old: TileRef,
        new: TileRef,
        layer: CollisionLayer,
    },
    EntityDeleted(Entity),
}

/// A search job finished.
#[derive(Event, Debug, Clone, PartialEq)]
pub struct PathCompleted(pub PathOutcome);

fn queue_world_changes(
    mut pathfinding: ResMut<PathfindingSystem>,
    mut changes: EventReader<WorldChange>,
) {
    for change in changes.read() {
        match *change {
            WorldChange::GridAdded(grid) => pathfinding.on_grid_added(grid),
            WorldChange::GridRemoved(grid) => pathfinding.on_grid_removed(grid),
            WorldChange::TileChanged(tile) => pathfinding.on_tile_changed(tile),
            WorldChange::CollisionChanged {
                entity,
                enabled,
                tile,
                body,
            } => pathfinding.on_collision_changed(entity, enabled, tile, body),
            WorldChange::EntityMoved {
                entity,
                old,
                new,
                layer,
            } => pathfinding.on_entity_moved(entity, old, new, layer),
            WorldChange::EntityDeleted(entity) => pathfinding.on_entity_deleted(entity),
        }
    }
}

fn update_pathfinding<W: TileSource + Resource>(
    mut pathfinding: ResMut<PathfindingSystem>,
    world: Res<W>,
    time: Res<Time>,
) {
    pathfinding.update(&*world, time.delta());
}

fn publish_outcomes(
    mut pathfinding: ResMut<PathfindingSystem>,
    mut completed: EventWriter<PathCompleted>,
) {
    for outcome in pathfinding.drain_completed() {
        log::debug!("{} finished as {:?}", outcome.job, outcome.state);
        completed.write(PathCompleted(outcome));
    }
}
