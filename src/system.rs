//! The `PathfindingSystem`: graph, change queue and job scheduler behind one handle.
use std::sync::Arc;
use std::time::Duration;

use bevy::{ecs::entity::Entity, math::IVec2, prelude::Resource};

use crate::{
    access::{AccessCredentials, AccessReader},
    changes::{Body, ChangeQueue, GraphChange},
    error::PathfindingError,
    graph::GraphStore,
    job::{CancellationToken, JobHandle, JobId, JobState, PathOutcome, SearchJob},
    node::PathfindingNode,
    scheduler::JobQueue,
    settings::PathfindingSettings,
    traversal::PathfindingArgs,
    world::TileSource,
    CollisionLayer, GridId, TileRef,
};

/// Incremental pathfinding over a live tile world.
///
/// World changes are queued by the `on_*` methods and applied during [`PathfindingSystem::update`],
/// at most [`PathfindingSettings::max_updates_per_tick`] per call. Path requests become jobs that
/// each update advances by [`PathfindingSettings::expansions_per_step`] expansions. Changes are
/// always applied before jobs are stepped, so all jobs in one update see the same graph.
///
/// ```
/// use bevy::math::IVec2;
/// use bevy_tilepath::prelude::*;
/// use std::time::Duration;
///
/// let grid = GridId(0);
/// let mut world = TileMap::new();
/// world.add_grid(grid, IVec2::ZERO, IVec2::new(9, 9));
///
/// let mut pathfinding = PathfindingSystem::default();
/// pathfinding.on_grid_added(grid);
///
/// let handle = pathfinding.request_path(
///     TileRef::new(grid, IVec2::new(0, 0)),
///     TileRef::new(grid, IVec2::new(9, 9)),
///     PathfindingArgs::new(1),
///     CancellationToken::new(),
/// );
/// pathfinding.update(&world, Duration::from_millis(16));
///
/// let outcome = pathfinding.take_outcome(handle.id).unwrap();
/// assert_eq!(outcome.state, JobState::Succeeded);
/// assert_eq!(outcome.path.unwrap().len(), 10);
/// ```
#[derive(Resource)]
pub struct PathfindingSystem {
    settings: PathfindingSettings,
    graph: GraphStore,
    changes: ChangeQueue,
    jobs: JobQueue,
    tick: u64,
    elapsed: Duration,
}

impl Default for PathfindingSystem {
    fn default() -> Self {
        Self::new(PathfindingSettings::default())
    }
}

impl PathfindingSystem {
    pub fn new(settings: PathfindingSettings) -> Self {
        PathfindingSystem {
            graph: GraphStore::new(),
            changes: ChangeQueue::new(settings.backlog_warning),
            jobs: JobQueue::default(),
            settings,
            tick: 0,
            elapsed: Duration::ZERO,
        }
    }

    pub fn settings(&self) -> &PathfindingSettings {
        &self.settings
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Number of updates run so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Sum of the deltas passed to [`PathfindingSystem::update`].
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    pub fn active_jobs(&self) -> usize {
        self.jobs.active_count()
    }

    fn tracks(&self, layer: CollisionLayer) -> bool {
        layer & self.settings.tracked_layers != 0
    }

    pub fn on_tile_changed(&mut self, tile: TileRef) {
        self.changes.push(GraphChange::TileUpdate(tile));
    }

    /// Queues an update for every listed tile of a grid.
    pub fn on_grid_changed(&mut self, grid: GridId, tiles: impl IntoIterator<Item = IVec2>) {
        for pos in tiles {
            self.changes
                .push(GraphChange::TileUpdate(TileRef::new(grid, pos)));
        }
    }

    pub fn on_grid_added(&mut self, grid: GridId) {
        self.changes.push(GraphChange::GridAdded(grid));
    }

    pub fn on_grid_removed(&mut self, grid: GridId) {
        self.changes.push(GraphChange::GridRemoved(grid));
    }

    /// An entity's collision was switched on or off. Ignored unless its layer is tracked.
    pub fn on_collision_changed(&mut self, entity: Entity, enabled: bool, tile: TileRef, body: Body) {
        if !self.tracks(body.layer) {
            return;
        }

        if enabled {
            self.changes
                .push(GraphChange::CollidableAdd { entity, tile, body });
        } else {
            self.changes.push(GraphChange::CollidableRemove(entity));
        }
    }

    /// An entity changed tiles. Ignored unless its layer is tracked.
    pub fn on_entity_moved(&mut self, entity: Entity, old: TileRef, new: TileRef, layer: CollisionLayer) {
        if !self.tracks(layer) {
            return;
        }

        self.changes.push(GraphChange::CollidableMove {
            entity,
            old,
            new,
            layer,
        });
    }

    pub fn on_entity_deleted(&mut self, entity: Entity) {
        self.changes.push(GraphChange::CollidableRemove(entity));
    }

    /// Puts an access reader on a tile immediately, without going through the queue.
    pub fn register_access_reader<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        entity: Entity,
        tile: TileRef,
        reader: impl AccessReader + 'static,
    ) -> Result<(), PathfindingError> {
        self.changes
            .register_access_reader(&mut self.graph, world, entity, tile, Arc::new(reader))
    }

    pub fn unregister_access_reader<W: TileSource + ?Sized>(&mut self, world: &W, entity: Entity) -> bool {
        self.changes
            .unregister_access_reader(&mut self.graph, world, entity)
    }

    /// Queues a search. The job starts on the next update, after that update's changes are
    /// applied; poll [`PathfindingSystem::job_state`] or collect the result with
    /// [`PathfindingSystem::take_outcome`] within [`PathfindingSettings::outcome_retention`]
    /// updates of it finishing.
    ///
    /// A request that names an unknown grid still gets a job, which fails on its first step.
    pub fn request_path(
        &mut self,
        start: TileRef,
        end: TileRef,
        args: PathfindingArgs,
        token: CancellationToken,
    ) -> JobHandle {
        let id = self.jobs.next_id();
        self.jobs
            .push(SearchJob::new(id, start, end, args, token.clone()));
        JobHandle { id, token }
    }

    /// The node of a tile, creating its chunk if needed.
    pub fn get_node<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        tile: TileRef,
    ) -> Result<&PathfindingNode, PathfindingError> {
        self.graph.get_node(world, tile)
    }

    /// Whether an agent with this mask and these credentials may stand on the tile.
    pub fn can_traverse<W: TileSource + ?Sized>(
        &mut self,
        world: &W,
        tile: TileRef,
        collision_mask: CollisionLayer,
        access: &AccessCredentials,
    ) -> bool {
        self.graph
            .get_node(world, tile)
            .is_ok_and(|node| node.is_traversable(collision_mask, access))
    }

    /// Runs one tick: applies queued changes, then steps every active job. Outcomes left
    /// uncollected for [`PathfindingSettings::outcome_retention`] updates are dropped.
    pub fn update<W: TileSource + ?Sized>(&mut self, world: &W, delta: Duration) {
        self.tick += 1;
        self.elapsed += delta;

        let max = self.settings.max_updates_per_tick;
        timed!("Applied graph changes", {
            self.changes.process(&mut self.graph, world, max)
        });

        self.jobs.prepare(&mut self.graph, world);
        let budget = self.settings.expansions_per_step;
        timed!("Stepped search jobs", {
            self.jobs.process(&self.graph, budget)
        });
        self.jobs.expire(self.settings.outcome_retention);
    }

    /// `None` if the job is unknown or its outcome was already taken.
    pub fn job_state(&self, id: JobId) -> Option<JobState> {
        self.jobs.state(id)
    }

    /// Removes and returns a finished job's outcome.
    pub fn take_outcome(&mut self, id: JobId) -> Option<PathOutcome> {
        self.jobs.take_outcome(id)
    }

    /// Removes and returns every finished outcome, in completion order.
    pub fn drain_completed(&mut self) -> Vec<PathOutcome> {
        self.jobs.drain_completed()
    }

    pub fn completed_count(&self) -> usize {
        self.jobs.completed_count()
    }

    /// Forgets everything: graph, queued changes, entity positions, jobs and outcomes.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.changes.clear();
        self.jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{access::AccessList, settings::PathfindingSettingsBuilder, world::TileMap};

    const GRID: GridId = GridId(0);

    fn tile(x: i32, y: i32) -> TileRef {
        TileRef::new(GRID, IVec2::new(x, y))
    }

    fn setup(settings: PathfindingSettings) -> (PathfindingSystem, TileMap) {
        let mut world = TileMap::new();
        world.add_grid(GRID, IVec2::ZERO, IVec2::new(15, 15));
        let mut system = PathfindingSystem::new(settings);
        system.on_grid_added(GRID);
        system.update(&world, Duration::ZERO);
        (system, world)
    }

    fn wall(system: &mut PathfindingSystem, x: i32, ys: std::ops::RangeInclusive<i32>) {
        for y in ys {
            let entity = Entity::from_raw((x * 100 + y) as u32);
            system.on_collision_changed(entity, true, tile(x, y), Body::new(1, true));
        }
    }

    fn finish(system: &mut PathfindingSystem, world: &TileMap, handle: &JobHandle) -> PathOutcome {
        for _ in 0..1000 {
            if let Some(outcome) = system.take_outcome(handle.id) {
                return outcome;
            }
            system.update(world, Duration::from_millis(16));
        }
        panic!("{} never finished", handle.id);
    }

    #[test]
    fn test_changes_apply_before_jobs() {
        let (mut system, world) = setup(PathfindingSettings::default());
        let handle = system.request_path(tile(0, 5), tile(10, 5), PathfindingArgs::new(1), CancellationToken::new());
        // queued in the same tick as the request: the job must already route around it
        wall(&mut system, 5, 0..=14);

        let outcome = finish(&mut system, &world, &handle);
        let path = outcome.path.unwrap();
        assert!(path.iter().all(|t| t.pos.x != 5 || t.pos.y == 15));
        assert_eq!(system.pending_changes(), 0);
    }

    #[test]
    fn test_request_in_same_tick_as_grid_added() {
        let mut world = TileMap::new();
        world.add_grid(GRID, IVec2::ZERO, IVec2::new(9, 9));
        let mut system = PathfindingSystem::default();

        system.on_grid_added(GRID);
        let handle = system.request_path(tile(0, 0), tile(5, 5), PathfindingArgs::new(1), CancellationToken::new());
        assert_eq!(system.graph().chunk_count(GRID), 0);

        system.update(&world, Duration::ZERO);
        assert_eq!(system.job_state(handle.id), Some(JobState::Succeeded));
        assert_eq!(system.take_outcome(handle.id).unwrap().path.unwrap().len(), 6);
    }

    #[test]
    fn test_request_before_grid_removed_fails() {
        let (mut system, world) = setup(PathfindingSettings::default());
        let handle = system.request_path(tile(0, 0), tile(5, 5), PathfindingArgs::new(1), CancellationToken::new());
        system.on_grid_removed(GRID);

        system.update(&world, Duration::ZERO);
        assert_eq!(system.job_state(handle.id), Some(JobState::Failed));
    }

    #[test]
    fn test_uncollected_outcomes_are_dropped() {
        let settings = PathfindingSettingsBuilder::new().outcome_retention(3).build();
        let (mut system, world) = setup(settings);

        let handle = system.request_path(tile(0, 0), tile(2, 2), PathfindingArgs::new(1), CancellationToken::new());
        let cancelled = system.request_path(tile(0, 0), tile(15, 15), PathfindingArgs::new(1), CancellationToken::new());
        cancelled.cancel();
        system.update(&world, Duration::ZERO);
        assert_eq!(system.completed_count(), 2);

        system.update(&world, Duration::ZERO);
        system.update(&world, Duration::ZERO);
        assert_eq!(system.completed_count(), 2);

        system.update(&world, Duration::ZERO);
        assert_eq!(system.completed_count(), 0);
        assert_eq!(system.job_state(handle.id), None);
        assert_eq!(system.job_state(cancelled.id), None);
    }

    #[test]
    fn test_bounded_drain_per_update() {
        let (mut system, world) = setup(PathfindingSettings::default());
        system.on_grid_changed(GRID, (0..120).map(|i| IVec2::new(i % 16, i / 16)));

        system.update(&world, Duration::ZERO);
        assert_eq!(system.pending_changes(), 70);
        system.update(&world, Duration::ZERO);
        assert_eq!(system.pending_changes(), 20);
        system.update(&world, Duration::ZERO);
        assert_eq!(system.pending_changes(), 0);
        assert_eq!(system.tick(), 4);
    }

    #[test]
    fn test_untracked_layers_are_ignored() {
        let settings = PathfindingSettingsBuilder::new().tracked_layers(0b10).build();
        let (mut system, world) = setup(settings);

        system.on_collision_changed(Entity::from_raw(1), true, tile(3, 3), Body::new(0b01, true));
        system.on_entity_moved(Entity::from_raw(1), tile(3, 3), tile(4, 3), 0b01);
        assert_eq!(system.pending_changes(), 0);

        system.on_collision_changed(Entity::from_raw(2), true, tile(3, 3), Body::new(0b11, true));
        system.update(&world, Duration::ZERO);
        assert_eq!(system.get_node(&world, tile(3, 3)).unwrap().blocked_mask(), 0b11);
    }

    #[test]
    fn test_entity_deleted() {
        let (mut system, world) = setup(PathfindingSettings::default());
        let crate_entity = Entity::from_raw(4);
        system.on_collision_changed(crate_entity, true, tile(2, 2), Body::new(1, true));
        system.update(&world, Duration::ZERO);
        assert!(!system.can_traverse(&world, tile(2, 2), 1, &AccessCredentials::new()));

        system.on_entity_deleted(crate_entity);
        system.update(&world, Duration::ZERO);
        assert!(system.can_traverse(&world, tile(2, 2), 1, &AccessCredentials::new()));
    }

    #[test]
    fn test_repeat_request_same_path() {
        let (mut system, world) = setup(PathfindingSettings::default());
        wall(&mut system, 7, 2..=15);
        system.update(&world, Duration::ZERO);

        let args = PathfindingArgs::new(1);
        let first = system.request_path(tile(0, 9), tile(14, 9), args.clone(), CancellationToken::new());
        let first = finish(&mut system, &world, &first).path.unwrap();
        let second = system.request_path(tile(0, 9), tile(14, 9), args, CancellationToken::new());
        let second = finish(&mut system, &world, &second).path.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.cost(), second.cost());
    }

    #[test]
    fn test_job_states() {
        let settings = PathfindingSettingsBuilder::new().expansions_per_step(1).build();
        let (mut system, world) = setup(settings);
        let handle = system.request_path(tile(0, 0), tile(15, 15), PathfindingArgs::new(1), CancellationToken::new());

        assert_eq!(system.job_state(handle.id), Some(JobState::Queued));
        system.update(&world, Duration::ZERO);
        assert_eq!(system.job_state(handle.id), Some(JobState::Running));

        handle.cancel();
        system.update(&world, Duration::ZERO);
        assert_eq!(system.job_state(handle.id), Some(JobState::Cancelled));
        assert_eq!(system.drain_completed().len(), 1);
        assert_eq!(system.job_state(handle.id), None);
    }

    #[test]
    fn test_unknown_grid_request_fails() {
        let (mut system, world) = setup(PathfindingSettings::default());
        let handle = system.request_path(
            TileRef::new(GridId(3), IVec2::ZERO),
            TileRef::new(GridId(3), IVec2::ONE),
            PathfindingArgs::new(1),
            CancellationToken::new(),
        );

        assert_eq!(finish(&mut system, &world, &handle).state, JobState::Failed);
    }

    #[test]
    fn test_grid_removed_fails_running_job() {
        let settings = PathfindingSettingsBuilder::new().expansions_per_step(1).build();
        let (mut system, world) = setup(settings);
        let handle = system.request_path(tile(0, 0), tile(15, 15), PathfindingArgs::new(1), CancellationToken::new());
        system.update(&world, Duration::ZERO);

        system.on_grid_removed(GRID);
        let outcome = finish(&mut system, &world, &handle);
        assert_eq!(outcome.state, JobState::Failed);
        assert!(!system.graph().has_grid(GRID));
    }

    #[test]
    fn test_access_reader() {
        let (mut system, world) = setup(PathfindingSettings::default());
        let door = Entity::from_raw(50);
        wall(&mut system, 7, 0..=15);
        system.update(&world, Duration::ZERO);
        system.on_collision_changed(Entity::from_raw(706), false, tile(7, 6), Body::new(1, true));
        system.update(&world, Duration::ZERO);
        system
            .register_access_reader(&world, door, tile(7, 6), AccessList::new(["command"]))
            .unwrap();

        let denied = system.request_path(tile(0, 6), tile(14, 6), PathfindingArgs::new(1), CancellationToken::new());
        assert_eq!(finish(&mut system, &world, &denied).state, JobState::Failed);

        let args = PathfindingArgs::new(1).with_access(AccessCredentials::new().with("command"));
        let allowed = system.request_path(tile(0, 6), tile(14, 6), args, CancellationToken::new());
        let path = finish(&mut system, &world, &allowed).path.unwrap();
        assert!(path.is_position_in_path(tile(7, 6)));

        assert!(system.unregister_access_reader(&world, door));
        assert!(system.can_traverse(&world, tile(7, 6), 1, &AccessCredentials::new()));
    }

    #[test]
    fn test_reset() {
        let (mut system, world) = setup(PathfindingSettings::default());
        system.on_tile_changed(tile(1, 1));
        system.request_path(tile(0, 0), tile(3, 3), PathfindingArgs::new(1), CancellationToken::new());

        system.reset();
        assert_eq!(system.pending_changes(), 0);
        assert_eq!(system.active_jobs(), 0);
        assert!(!system.graph().has_grid(GRID));
    }
}
