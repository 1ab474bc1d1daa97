//! Tuning for the per-tick work the pathfinding system does.
use crate::CollisionLayer;

/// Settings for a [`crate::system::PathfindingSystem`]. Build them with
/// [`PathfindingSettingsBuilder`].
///
/// ```
/// use bevy_tilepath::prelude::*;
///
/// let settings = PathfindingSettingsBuilder::new()
///     .max_updates_per_tick(100)
///     .expansions_per_step(500)
///     .tracked_layers(0b0110)
///     .build();
///
/// let system = PathfindingSystem::new(settings);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathfindingSettings {
    pub(crate) max_updates_per_tick: usize,
    pub(crate) backlog_warning: usize,
    pub(crate) expansions_per_step: usize,
    pub(crate) tracked_layers: CollisionLayer,
    pub(crate) outcome_retention: u64,
}

impl Default for PathfindingSettings {
    fn default() -> Self {
        PathfindingSettingsBuilder::new().build()
    }
}

impl PathfindingSettings {
    pub fn max_updates_per_tick(&self) -> usize {
        self.max_updates_per_tick
    }

    pub fn backlog_warning(&self) -> usize {
        self.backlog_warning
    }

    pub fn expansions_per_step(&self) -> usize {
        self.expansions_per_step
    }

    pub fn tracked_layers(&self) -> CollisionLayer {
        self.tracked_layers
    }

    pub fn outcome_retention(&self) -> u64 {
        self.outcome_retention
    }
}

#[derive(Debug, Clone)]
pub struct PathfindingSettingsBuilder {
    max_updates_per_tick: usize,
    backlog_warning: usize,
    expansions_per_step: usize,
    tracked_layers: CollisionLayer,
    outcome_retention: u64,
}

impl Default for PathfindingSettingsBuilder {
    fn default() -> Self {
        PathfindingSettingsBuilder {
            max_updates_per_tick: 50,
            backlog_warning: 1000,
            expansions_per_step: 200,
            tracked_layers: CollisionLayer::MAX,
            outcome_retention: 300,
        }
    }
}

impl PathfindingSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum queued graph changes applied per update. Must be at least 1.
    pub fn max_updates_per_tick(mut self, max: usize) -> Self {
        if max == 0 {
            panic!("Max updates per tick must be at least 1");
        }

        self.max_updates_per_tick = max;
        self
    }

    /// Queue length above which each update logs a warning.
    pub fn backlog_warning(mut self, len: usize) -> Self {
        self.backlog_warning = len;
        self
    }

    /// Node expansions each job gets per update. Must be at least 1.
    pub fn expansions_per_step(mut self, expansions: usize) -> Self {
        if expansions == 0 {
            panic!("Expansions per step must be at least 1");
        }

        self.expansions_per_step = expansions;
        self
    }

    /// Collision layers the graph cares about. Collision and movement events for entities on no
    /// tracked layer are ignored.
    pub fn tracked_layers(mut self, layers: CollisionLayer) -> Self {
        self.tracked_layers = layers;
        self
    }

    /// Updates a finished outcome is kept for collection before it is dropped. Must be at least 1.
    pub fn outcome_retention(mut self, ticks: u64) -> Self {
        if ticks == 0 {
            panic!("Outcome retention must be at least 1 tick");
        }

        self.outcome_retention = ticks;
        self
    }

    pub fn build(self) -> PathfindingSettings {
        PathfindingSettings {
            max_updates_per_tick: self.max_updates_per_tick,
            backlog_warning: self.backlog_warning,
            expansions_per_step: self.expansions_per_step,
            tracked_layers: self.tracked_layers,
            outcome_retention: self.outcome_retention,
        }
    }
}
